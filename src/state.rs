use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::RwLock;

/// Telemetry channels sampled from the lamp entity. The serialized name is
/// also the NGSI attribute queried from STH-Comet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Luminosity,
    Temperature,
    Humidity,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Luminosity,
        ChannelKind::Temperature,
        ChannelKind::Humidity,
    ];

    pub fn attribute(&self) -> &'static str {
        match self {
            ChannelKind::Luminosity => "luminosity",
            ChannelKind::Temperature => "temperature",
            ChannelKind::Humidity => "humidity",
        }
    }

    pub fn parse(name: &str) -> Option<ChannelKind> {
        match name {
            "luminosity" => Some(ChannelKind::Luminosity),
            "temperature" => Some(ChannelKind::Temperature),
            "humidity" => Some(ChannelKind::Humidity),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

/// Where an interval average landed relative to its channel's band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Within,
    AboveMax,
    BelowMin,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Within => "within_band",
            Classification::AboveMax => "above_max",
            Classification::BelowMin => "below_min",
        }
    }

    pub fn is_alarm(&self) -> bool {
        !matches!(self, Classification::Within)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The `[min, max]` range a channel is expected to stay inside.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    /// Above is checked before below, so a band misconfigured with
    /// `min > max` resolves ties in favor of `AboveMax`.
    pub fn classify(&self, average: f64) -> Classification {
        if average > self.max {
            Classification::AboveMax
        } else if average < self.min {
            Classification::BelowMin
        } else {
            Classification::Within
        }
    }
}

/// One normalized observation, ready to be folded into an interval average.
#[derive(Debug, Clone)]
pub struct Sample {
    pub value: f64,
    pub recorded_at: DateTime<Tz>,
}

/// The averaged outcome of one poll tick for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalPoint {
    pub average: f64,
    pub recorded_at: DateTime<Tz>,
}

/// Append-only per-channel aggregate state.
///
/// History grows for the life of the process; there is no eviction. Callers
/// that need bounded payloads downsample at the presentation layer instead.
#[derive(Debug, Default)]
pub struct ChannelSeries {
    history: Vec<IntervalPoint>,
    sum: f64,
    within_band: u64,
    above_max: u64,
    below_min: u64,
    last_classification: Option<Classification>,
}

impl ChannelSeries {
    /// Fold one batch of samples into a single interval point.
    ///
    /// The averaged value is stamped with the newest observation time in the
    /// batch, not a mean of timestamps. An empty batch records nothing and
    /// leaves every aggregate untouched.
    pub fn record_interval(&mut self, samples: &[Sample]) -> Option<IntervalPoint> {
        let newest = samples.last()?;
        let average = samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64;
        let point = IntervalPoint {
            average,
            recorded_at: newest.recorded_at,
        };
        self.history.push(point.clone());
        self.sum += average;
        Some(point)
    }

    /// Classify the latest interval average and bump exactly one counter.
    ///
    /// Only called after a successful `record_interval`, so the counters
    /// reflect data-bearing ticks only.
    pub fn classify(&mut self, band: Band, latest_average: f64) -> Classification {
        let classification = band.classify(latest_average);
        match classification {
            Classification::Within => self.within_band += 1,
            Classification::AboveMax => self.above_max += 1,
            Classification::BelowMin => self.below_min += 1,
        }
        self.last_classification = Some(classification);
        classification
    }

    /// Mean of the recorded interval averages (a mean of means).
    pub fn total_average(&self) -> Option<f64> {
        if self.history.is_empty() {
            None
        } else {
            Some(self.sum / self.history.len() as f64)
        }
    }

    pub fn history(&self) -> &[IntervalPoint] {
        &self.history
    }

    pub fn last_classification(&self) -> Option<Classification> {
        self.last_classification
    }

    fn snapshot(&self, channel: ChannelKind) -> ChannelSnapshot {
        let latest = self.history.last();
        ChannelSnapshot {
            channel,
            latest_average: latest.map(|p| p.average),
            total_average: self.total_average(),
            last_classification: self.last_classification,
            within_band: self.within_band,
            above_max: self.above_max,
            below_min: self.below_min,
            intervals: self.history.len(),
            last_recorded_at: latest.map(|p| p.recorded_at),
        }
    }
}

/// Outcome of one recorded interval, handed back to the poller for logging
/// and metrics.
#[derive(Debug, Clone)]
pub struct RecordedInterval {
    pub point: IntervalPoint,
    pub classification: Classification,
    pub total_average: f64,
}

/// Per-channel view served by the REST API.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub channel: ChannelKind,
    pub latest_average: Option<f64>,
    pub total_average: Option<f64>,
    pub last_classification: Option<Classification>,
    pub within_band: u64,
    pub above_max: u64,
    pub below_min: u64,
    pub intervals: usize,
    pub last_recorded_at: Option<DateTime<Tz>>,
}

/// Process-wide lamp target asserted through Orion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LampCommand {
    On,
    #[default]
    Off,
}

impl LampCommand {
    /// The NGSI command attribute asserted on the entity.
    pub fn attribute(&self) -> &'static str {
        match self {
            LampCommand::On => "on",
            LampCommand::Off => "off",
        }
    }
}

impl fmt::Display for LampCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

/// One lamp state transition, kept for the presentation API.
#[derive(Debug, Clone, Serialize)]
pub struct LampEvent {
    pub state: LampCommand,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LampState {
    current: LampCommand,
    events: Vec<LampEvent>,
    asserted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewSnapshot {
    pub lamp: LampCommand,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub generated_at: Option<DateTime<Utc>>,
    pub channels: Vec<ChannelSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopHealth {
    pub name: String,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl LoopHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_success_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

#[derive(Default)]
struct SharedStateInner {
    channels: RwLock<HashMap<ChannelKind, ChannelSeries>>,
    lamp: RwLock<LampState>,
    loop_health: RwLock<HashMap<String, LoopHealth>>,
}

/// Shared state container for the HTTP layer and the poller loop.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<SharedStateInner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SharedStateInner::default()),
        }
    }

    /// Record one batch for a channel and classify the resulting average.
    ///
    /// Returns `None` when the batch is empty; the channel then keeps its
    /// last known classification and aggregates.
    pub async fn record_interval(
        &self,
        channel: ChannelKind,
        samples: &[Sample],
        band: Band,
    ) -> Option<RecordedInterval> {
        let mut guard = self.inner.channels.write().await;
        let series = guard.entry(channel).or_default();
        let point = series.record_interval(samples)?;
        let classification = series.classify(band, point.average);
        let total_average = series.total_average().unwrap_or(point.average);
        Some(RecordedInterval {
            point,
            classification,
            total_average,
        })
    }

    /// Lamp target derived from the last known classification of every
    /// channel. Stale classifications carry forward across empty ticks; a
    /// channel that has never produced data does not vote for `On`.
    pub async fn lamp_target(&self) -> LampCommand {
        let guard = self.inner.channels.read().await;
        let alarm = guard
            .values()
            .any(|series| series.last_classification().is_some_and(|c| c.is_alarm()));
        if alarm { LampCommand::On } else { LampCommand::Off }
    }

    /// Assert the computed target. A change from the previous state appends
    /// a transition event; re-asserting the same state does not.
    pub async fn assert_lamp(&self, target: LampCommand) {
        let mut guard = self.inner.lamp.write().await;
        let now = Utc::now();
        if guard.current != target {
            guard.events.push(LampEvent {
                state: target,
                at: now,
            });
            guard.current = target;
        }
        guard.asserted_at = Some(now);
    }

    pub async fn lamp_state(&self) -> LampCommand {
        self.inner.lamp.read().await.current
    }

    pub async fn list_lamp_events(&self) -> Vec<LampEvent> {
        self.inner.lamp.read().await.events.clone()
    }

    pub async fn overview(&self) -> OverviewSnapshot {
        let (lamp, generated_at) = {
            let guard = self.inner.lamp.read().await;
            (guard.current, guard.asserted_at)
        };
        OverviewSnapshot {
            lamp,
            generated_at,
            channels: self.channel_snapshots().await,
        }
    }

    pub async fn channel_snapshots(&self) -> Vec<ChannelSnapshot> {
        let guard = self.inner.channels.read().await;
        ChannelKind::ALL
            .iter()
            .map(|kind| match guard.get(kind) {
                Some(series) => series.snapshot(*kind),
                None => ChannelSeries::default().snapshot(*kind),
            })
            .collect()
    }

    pub async fn channel_snapshot(&self, channel: ChannelKind) -> ChannelSnapshot {
        let guard = self.inner.channels.read().await;
        match guard.get(&channel) {
            Some(series) => series.snapshot(channel),
            None => ChannelSeries::default().snapshot(channel),
        }
    }

    pub async fn channel_history(&self, channel: ChannelKind) -> Vec<IntervalPoint> {
        let guard = self.inner.channels.read().await;
        guard
            .get(&channel)
            .map(|series| series.history().to_vec())
            .unwrap_or_default()
    }

    pub async fn record_loop_success(&self, loop_name: &str) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.last_success_at = Some(Utc::now());
        entry.consecutive_failures = 0;
        entry.last_error = None;
    }

    pub async fn record_loop_failure(&self, loop_name: &str, error: String) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(error);
    }

    pub async fn is_ready(&self, loop_names: &[&str], max_staleness: Duration) -> bool {
        let health = self.inner.loop_health.read().await;
        let now = Utc::now();
        let staleness = chrono::Duration::from_std(max_staleness)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        loop_names.iter().all(|name| {
            if let Some(entry) = health.get(*name) {
                if entry.consecutive_failures > 0 {
                    return false;
                }
                if let Some(last) = entry.last_success_at {
                    return now.signed_duration_since(last) <= staleness;
                }
                false
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone;

    fn sample(value: f64, timestamp: &str) -> Sample {
        Sample {
            value,
            recorded_at: timezone::normalize(timestamp).expect("test timestamp"),
        }
    }

    #[test]
    fn band_boundaries_count_as_within() {
        let band = Band {
            min: 15.0,
            max: 25.0,
        };
        assert_eq!(band.classify(15.0), Classification::Within);
        assert_eq!(band.classify(25.0), Classification::Within);
        assert_eq!(band.classify(25.001), Classification::AboveMax);
        assert_eq!(band.classify(14.999), Classification::BelowMin);
    }

    #[test]
    fn inverted_band_resolves_above_first() {
        let band = Band {
            min: 30.0,
            max: 10.0,
        };
        assert_eq!(band.classify(20.0), Classification::AboveMax);
    }

    #[test]
    fn interval_average_is_stamped_with_newest_timestamp() {
        let mut series = ChannelSeries::default();
        let batch = vec![
            sample(10.0, "2024-06-01T12:00:00.000Z"),
            sample(20.0, "2024-06-01T12:00:04.000Z"),
            sample(30.0, "2024-06-01T12:00:08.000Z"),
        ];

        let point = series.record_interval(&batch).expect("non-empty batch");
        assert!((point.average - 20.0).abs() < 1e-9);
        assert_eq!(point.recorded_at, batch[2].recorded_at);
        assert_eq!(series.history().len(), 1);
    }

    #[test]
    fn empty_batch_records_nothing() {
        let mut series = ChannelSeries::default();
        assert!(series.record_interval(&[]).is_none());
        assert!(series.history().is_empty());
        assert_eq!(series.total_average(), None);
    }
}
