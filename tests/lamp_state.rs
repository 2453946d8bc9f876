use lampmon::state::{Band, ChannelKind, LampCommand, Sample, SharedState};
use lampmon::timezone;

fn sample(value: f64) -> Sample {
    Sample {
        value,
        recorded_at: timezone::normalize("2024-06-01T12:00:00Z").expect("test timestamp"),
    }
}

const BAND: Band = Band {
    min: 0.0,
    max: 30.0,
};

#[tokio::test]
async fn lamp_starts_off() {
    let state = SharedState::new();
    assert_eq!(state.lamp_state().await, LampCommand::Off);
    assert_eq!(state.lamp_target().await, LampCommand::Off);
}

#[tokio::test]
async fn any_alarming_channel_turns_the_lamp_on() {
    let state = SharedState::new();

    state
        .record_interval(ChannelKind::Luminosity, &[sample(10.0)], BAND)
        .await
        .expect("non-empty batch");
    assert_eq!(state.lamp_target().await, LampCommand::Off);

    state
        .record_interval(ChannelKind::Temperature, &[sample(45.0)], BAND)
        .await
        .expect("non-empty batch");
    assert_eq!(state.lamp_target().await, LampCommand::On);
}

#[tokio::test]
async fn stale_classification_carries_forward_across_empty_ticks() {
    let state = SharedState::new();

    // Temperature alarms, then goes silent for two ticks while luminosity
    // keeps reporting in-band values.
    state
        .record_interval(ChannelKind::Temperature, &[sample(45.0)], BAND)
        .await
        .expect("non-empty batch");
    for _ in 0..2 {
        assert!(
            state
                .record_interval(ChannelKind::Temperature, &[], BAND)
                .await
                .is_none()
        );
        state
            .record_interval(ChannelKind::Luminosity, &[sample(12.0)], BAND)
            .await
            .expect("non-empty batch");
        assert_eq!(
            state.lamp_target().await,
            LampCommand::On,
            "stale alarm must keep the lamp on"
        );
    }

    // Temperature recovers; every last known classification is now within.
    state
        .record_interval(ChannelKind::Temperature, &[sample(20.0)], BAND)
        .await
        .expect("non-empty batch");
    assert_eq!(state.lamp_target().await, LampCommand::Off);
}

#[tokio::test]
async fn channels_without_data_do_not_vote() {
    let state = SharedState::new();

    // Only luminosity has ever reported, and it is within band; the two
    // silent channels must not force the lamp on.
    state
        .record_interval(ChannelKind::Luminosity, &[sample(15.0)], BAND)
        .await
        .expect("non-empty batch");
    assert_eq!(state.lamp_target().await, LampCommand::Off);
}

#[tokio::test]
async fn lamp_events_record_transitions_only() {
    let state = SharedState::new();

    // Re-asserting the initial state is not a transition.
    state.assert_lamp(LampCommand::Off).await;
    assert!(state.list_lamp_events().await.is_empty());

    state.assert_lamp(LampCommand::On).await;
    state.assert_lamp(LampCommand::On).await;
    state.assert_lamp(LampCommand::Off).await;

    let events = state.list_lamp_events().await;
    assert_eq!(events.len(), 2, "level-triggered re-asserts must not log");
    assert_eq!(events[0].state, LampCommand::On);
    assert_eq!(events[1].state, LampCommand::Off);
    assert_eq!(state.lamp_state().await, LampCommand::Off);
}
