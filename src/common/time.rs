//! Timestamp helpers shared by the artifact writer and the HTTP layer.

use chrono::{Local, Utc};

/// ISO-8601 timestamp in local time, used in responses.
pub fn now_iso() -> String {
    Local::now().to_rfc3339()
}

/// Compact UTC stamp stored in artifact metadata (`20240131_174502`).
pub fn now_stamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
