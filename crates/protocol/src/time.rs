//! Timestamp helpers
//!
//! Stores persist instants as Unix milliseconds (`BIGINT`) so ordering is a
//! plain integer comparison on every backend.

use chrono::{DateTime, Utc};

/// Convert an instant to Unix milliseconds
#[inline]
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert Unix milliseconds back to an instant
///
/// Out-of-range values clamp to the Unix epoch.
#[inline]
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Convert optional Unix milliseconds
#[inline]
pub fn from_millis_opt(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(from_millis)
}
