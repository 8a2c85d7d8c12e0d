//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Format milliseconds as seconds with millisecond precision, for ffmpeg
/// arguments (`-ss`, `-t`) which take fractional seconds.
pub fn millis_to_secs_arg(millis: u64) -> String {
    format!("{}.{:03}", millis / 1000, millis % 1000)
}
