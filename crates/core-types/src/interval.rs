use std::time::Duration;

/// Parses an interval string like "15m", "1h", "4h", "1d" into minutes.
pub fn interval_minutes(interval: &str) -> Option<i64> {
    let (value, unit) = interval.split_at(interval.len().checked_sub(1)?);
    let value: i64 = value.parse().ok()?;
    if value <= 0 {
        return None;
    }
    match unit {
        "m" => Some(value),
        "h" => Some(value * 60),
        "d" => Some(value * 1_440),
        "w" => Some(value * 10_080),
        _ => None,
    }
}

/// The wall-clock duration of one bar of the given interval.
pub fn interval_duration(interval: &str) -> Option<Duration> {
    interval_minutes(interval).map(|m| Duration::from_secs(m as u64 * 60))
}
