use anyhow::{Result, bail};
use tracing::{error, info, instrument, warn};

use crate::app::AppContext;
use crate::state::{ChannelKind, Sample};
use crate::timezone;

/// One poll tick: fetch and aggregate every channel, then assert the lamp.
///
/// Channels are independent within a tick; actuation runs exactly once after
/// all of them, from the last known classification of each.
#[instrument(skip_all)]
pub async fn run(ctx: &AppContext) -> Result<()> {
    let last_n = ctx.config.sample.last_n;
    let mut dropped_batches = 0usize;

    for channel in ChannelKind::ALL {
        let raw = ctx.sth.fetch_samples(channel, last_n).await;
        if raw.is_empty() {
            // No update this tick; the channel keeps its last known state.
            continue;
        }

        let recv_times: Vec<&str> = raw.iter().map(|s| s.recv_time.as_str()).collect();
        let recorded_at = match timezone::normalize_batch(&recv_times) {
            Ok(timestamps) => timestamps,
            Err(err) => {
                error!(channel = %channel, error = ?err, "dropping batch with malformed timestamps");
                dropped_batches += 1;
                continue;
            }
        };

        let samples: Vec<Sample> = raw
            .iter()
            .zip(recorded_at)
            .map(|(sample, recorded_at)| Sample {
                value: sample.value,
                recorded_at,
            })
            .collect();

        let band = ctx.band(channel);
        if let Some(recorded) = ctx.state.record_interval(channel, &samples, band).await {
            ctx.metrics.observe_interval(
                channel,
                recorded.point.average,
                recorded.total_average,
                recorded.classification,
            );
            info!(
                channel = %channel,
                average = recorded.point.average,
                classification = %recorded.classification,
                "recorded interval"
            );
        }
    }

    // Level-triggered actuation: recompute and re-assert the target every
    // tick, whether or not it changed.
    let target = ctx.state.lamp_target().await;
    match ctx.orion.send_lamp_command(target).await {
        Ok(()) => ctx.metrics.inc_lamp_command(),
        Err(err) => {
            warn!(error = ?err, state = %target, "lamp command failed; re-asserting next tick");
            ctx.metrics.inc_lamp_command_failure();
        }
    }
    ctx.state.assert_lamp(target).await;
    ctx.metrics.set_lamp_state(target);

    if dropped_batches > 0 {
        bail!("dropped {dropped_batches} batch(es) with malformed timestamps");
    }
    Ok(())
}
