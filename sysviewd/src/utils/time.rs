use chrono::{Local, SecondsFormat};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current local time as ISO-8601 with millisecond precision.
pub fn iso_now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Wall-clock seconds since the epoch. For human-facing values only.
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs())
        .unwrap_or(0)
}
