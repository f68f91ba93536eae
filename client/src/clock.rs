//! Wall-clock helpers. The engine takes timestamps as plain milliseconds.

use chrono::{DateTime, TimeZone, Utc};
use jigsync_engine::Timestamp;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis().max(0) as Timestamp
}

/// Convert an engine timestamp for display.
pub fn to_datetime(ts: Timestamp) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts as i64).single()
}
