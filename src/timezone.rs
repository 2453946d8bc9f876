use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;

/// Target zone for every timestamp surfaced by the agent. A design constant,
/// not configuration.
pub const TARGET_ZONE: Tz = chrono_tz::America::Sao_Paulo;

/// STH emits `recvTime` in UTC with millisecond precision, but older history
/// entries can lack the fractional part entirely.
const WITH_FRACTION: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const WITHOUT_FRACTION: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse one UTC `recvTime` string into the target zone.
pub fn normalize(timestamp: &str) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(timestamp, WITH_FRACTION)
        .or_else(|_| NaiveDateTime::parse_from_str(timestamp, WITHOUT_FRACTION))
        .with_context(|| format!("unrecognized timestamp format: {timestamp}"))?;
    Ok(naive.and_utc().with_timezone(&TARGET_ZONE))
}

/// Batch variant. Order- and length-preserving; one malformed element fails
/// the whole batch.
pub fn normalize_batch<S: AsRef<str>>(timestamps: &[S]) -> Result<Vec<DateTime<Tz>>> {
    timestamps
        .iter()
        .map(|timestamp| normalize(timestamp.as_ref()))
        .collect()
}
