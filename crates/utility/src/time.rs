use chrono::{DateTime, Duration, TimeZone, Utc};

/// Formats a duration as `hh:mm:ss`. Negative durations are shown as zero,
/// hours are not wrapped at 24.
pub fn format_hms(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Converts fractional seconds to a duration, rounding to whole seconds.
/// Non-finite input becomes `None`.
pub fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() {
        return None;
    }
    Duration::try_seconds(seconds.round() as i64)
}

pub fn from_timestamp_millis(timestamp_millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(timestamp_millis).single()
}
