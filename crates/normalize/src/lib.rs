//! Silt Normalize - Raw payload to normalized record
//!
//! A pure transform: no network, no storage, no global state. The only
//! ambient input is the clock used when a payload carries no usable
//! timestamp, and that can be pinned with [`Normalizer::normalize_at`].
//!
//! # Field Partitioning
//!
//! Each fixed field of [`NormalizedRecord`] may arrive under several aliases
//! (see [`aliases`]). The first alias holding a usable value wins. Every
//! alias key is then removed from the payload, whether or not its value was
//! used, and whatever top-level keys remain become the dynamic-field map.
//!
//! # Example
//!
//! ```
//! use silt_normalize::Normalizer;
//! use silt_protocol::Severity;
//!
//! let record = Normalizer::new()
//!     .normalize(br#"{"level":"WARN","msg":"slow","user_id":7}"#)
//!     .unwrap();
//!
//! assert_eq!(record.severity, Severity::Warn);
//! assert_eq!(record.free_text.as_deref(), Some("slow"));
//! assert!(record.dynamic_fields.contains_key("user_id"));
//! ```

pub mod aliases;
mod coerce;
mod timestamp;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use silt_protocol::{NormalizedRecord, Severity};

pub use coerce::normalize_severity;
pub use timestamp::{MILLIS_THRESHOLD, parse_timestamp};

use aliases::FixedField;

#[cfg(test)]
#[path = "normalizer_test.rs"]
mod tests;

/// Payload normalizer
///
/// Stateless; cheap to construct and to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Create a normalizer
    pub fn new() -> Self {
        Self
    }

    /// Normalize a serialized payload, falling back to the current time
    ///
    /// Returns `None` when the payload is not a JSON object.
    pub fn normalize(&self, payload: &[u8]) -> Option<NormalizedRecord> {
        self.normalize_at(payload, Utc::now())
    }

    /// Normalize a serialized payload with an explicit fallback time
    pub fn normalize_at(&self, payload: &[u8], now: DateTime<Utc>) -> Option<NormalizedRecord> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(map)) => Some(self.normalize_map(map, now)),
            _ => None,
        }
    }

    /// Normalize an already-decoded payload object
    pub fn normalize_map(
        &self,
        mut map: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> NormalizedRecord {
        let occurred_at =
            take_first(&mut map, FixedField::OccurredAt, parse_timestamp).unwrap_or(now);
        let severity = take_first(&mut map, FixedField::Severity, coerce::severity_value)
            .unwrap_or(Severity::Info);

        let mut record = NormalizedRecord::new(occurred_at, severity);
        record.free_text = take_first(&mut map, FixedField::FreeText, coerce::text);
        record.app = take_first(&mut map, FixedField::App, coerce::scalar_string);
        record.environment = take_first(&mut map, FixedField::Environment, coerce::scalar_string);
        record.correlation_id =
            take_first(&mut map, FixedField::CorrelationId, coerce::scalar_string);
        record.job_correlation_id =
            take_first(&mut map, FixedField::JobCorrelationId, coerce::scalar_string);
        record.duration = take_first(&mut map, FixedField::Duration, coerce::float);
        record.status_code = take_first(&mut map, FixedField::StatusCode, coerce::integer);
        record.route_controller =
            take_first(&mut map, FixedField::RouteController, coerce::scalar_string);
        record.route_action = take_first(&mut map, FixedField::RouteAction, coerce::scalar_string);
        record.route_path = take_first(&mut map, FixedField::RoutePath, coerce::scalar_string);
        record.http_method = take_first(&mut map, FixedField::HttpMethod, coerce::scalar_string)
            .map(|m| m.to_ascii_uppercase());

        record.dynamic_fields = map;
        record
    }
}

/// Remove every alias of `field` from the map, returning the first usable value
///
/// Aliases are visited in priority order; removal happens for all of them so
/// no alias key can leak into the dynamic map.
fn take_first<T>(
    map: &mut Map<String, Value>,
    field: FixedField,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let mut found = None;
    for alias in field.aliases() {
        if let Some(value) = map.remove(*alias)
            && found.is_none()
        {
            found = convert(&value);
        }
    }
    found
}

/// Extract the normalized severity from a payload object without consuming it
///
/// Used by producers that need the severity before normalization (for
/// example to decide on an eager flush). Missing severity reads as `Info`.
pub fn severity_of(map: &Map<String, Value>) -> Severity {
    FixedField::Severity
        .aliases()
        .iter()
        .find_map(|alias| map.get(*alias).and_then(coerce::severity_value))
        .unwrap_or(Severity::Info)
}
