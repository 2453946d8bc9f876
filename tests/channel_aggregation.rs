use lampmon::state::{Band, ChannelKind, Classification, Sample, SharedState};
use lampmon::timezone;

fn sample(value: f64) -> Sample {
    Sample {
        value,
        recorded_at: timezone::normalize("2024-06-01T12:00:00.000Z").expect("test timestamp"),
    }
}

const BAND: Band = Band {
    min: 0.0,
    max: 30.0,
};

#[tokio::test]
async fn classification_sequence_matches_band() {
    let state = SharedState::new();
    let averages = [10.0, 35.0, -5.0, 20.0];
    let expected = [
        Classification::Within,
        Classification::AboveMax,
        Classification::BelowMin,
        Classification::Within,
    ];

    for (average, expected) in averages.iter().zip(expected) {
        let recorded = state
            .record_interval(ChannelKind::Luminosity, &[sample(*average)], BAND)
            .await
            .expect("non-empty batch");
        assert_eq!(recorded.classification, expected);
    }

    let snapshot = state.channel_snapshot(ChannelKind::Luminosity).await;
    assert_eq!(snapshot.within_band, 2);
    assert_eq!(snapshot.above_max, 1);
    assert_eq!(snapshot.below_min, 1);
}

#[tokio::test]
async fn counters_sum_to_recorded_intervals() {
    let state = SharedState::new();
    let averages = [5.0, 40.0, 12.0, -1.0, 29.0, 31.0, 0.0];

    for average in averages {
        state
            .record_interval(ChannelKind::Humidity, &[sample(average)], BAND)
            .await
            .expect("non-empty batch");
        // Empty fetches in between must not disturb the invariant.
        assert!(
            state
                .record_interval(ChannelKind::Humidity, &[], BAND)
                .await
                .is_none()
        );
    }

    let snapshot = state.channel_snapshot(ChannelKind::Humidity).await;
    assert_eq!(snapshot.intervals, averages.len());
    assert_eq!(
        snapshot.within_band + snapshot.above_max + snapshot.below_min,
        averages.len() as u64
    );
}

#[tokio::test]
async fn empty_batch_leaves_all_aggregates_unchanged() {
    let state = SharedState::new();
    state
        .record_interval(ChannelKind::Temperature, &[sample(20.0)], BAND)
        .await
        .expect("non-empty batch");

    let before = state.channel_snapshot(ChannelKind::Temperature).await;
    assert!(
        state
            .record_interval(ChannelKind::Temperature, &[], BAND)
            .await
            .is_none()
    );
    let after = state.channel_snapshot(ChannelKind::Temperature).await;

    assert_eq!(before.intervals, after.intervals);
    assert_eq!(before.total_average, after.total_average);
    assert_eq!(before.within_band, after.within_band);
    assert_eq!(before.above_max, after.above_max);
    assert_eq!(before.below_min, after.below_min);
}

#[tokio::test]
async fn total_average_is_mean_of_interval_averages() {
    let state = SharedState::new();
    let mut sum = 0.0;

    for i in 1..=100 {
        let average = i as f64;
        sum += average;
        state
            .record_interval(ChannelKind::Luminosity, &[sample(average)], BAND)
            .await
            .expect("non-empty batch");

        let snapshot = state.channel_snapshot(ChannelKind::Luminosity).await;
        let expected = sum / i as f64;
        let total = snapshot.total_average.expect("at least one interval");
        assert!(
            (total - expected).abs() < 1e-9,
            "after {i} intervals expected {expected}, got {total}"
        );
    }
}

#[tokio::test]
async fn batch_average_uses_every_sample_once() {
    let state = SharedState::new();
    let batch = [sample(10.0), sample(20.0), sample(60.0)];

    let recorded = state
        .record_interval(ChannelKind::Temperature, &batch, BAND)
        .await
        .expect("non-empty batch");
    assert!((recorded.point.average - 30.0).abs() < 1e-9);
    // One batch of three samples yields exactly one interval point.
    let snapshot = state.channel_snapshot(ChannelKind::Temperature).await;
    assert_eq!(snapshot.intervals, 1);
}
