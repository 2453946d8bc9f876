use chrono::{Datelike, Timelike};
use lampmon::timezone::{normalize, normalize_batch};

#[test]
fn same_instant_with_and_without_fraction() {
    let with = normalize("2024-06-01T15:30:00.000Z").expect("with fraction");
    let without = normalize("2024-06-01T15:30:00Z").expect("without fraction");
    assert_eq!(with, without);
}

#[test]
fn utc_maps_to_sao_paulo_offset() {
    // 2024-06-01T02:00 UTC is 2024-05-31T23:00 in Sao Paulo (UTC-3).
    let converted = normalize("2024-06-01T02:00:00.250Z").expect("valid timestamp");
    assert_eq!(converted.day(), 31);
    assert_eq!(converted.hour(), 23);
}

#[test]
fn normalization_is_deterministic() {
    let first = normalize("2024-06-01T12:34:56.789Z").expect("valid timestamp");
    let second = normalize("2024-06-01T12:34:56.789Z").expect("valid timestamp");
    assert_eq!(first, second);
}

#[test]
fn batch_is_order_and_length_preserving() {
    let input = [
        "2024-06-01T12:00:00.000Z",
        "2024-06-01T12:00:10Z",
        "2024-06-01T12:00:20.500Z",
        "2024-06-01T12:00:30Z",
    ];
    let converted = normalize_batch(&input).expect("valid batch");
    assert_eq!(converted.len(), input.len());
    for pair in converted.windows(2) {
        assert!(pair[0] < pair[1], "ordering must be preserved");
    }
}

#[test]
fn genuinely_malformed_timestamps_fail() {
    assert!(normalize("2024-06-01 12:00:00").is_err());
    assert!(normalize("01/06/2024 12:00").is_err());
    assert!(normalize("").is_err());
    assert!(normalize_batch(&["2024-06-01T12:00:00Z", "junk"]).is_err());
}
