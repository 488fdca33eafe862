//! Normalized records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DynamicFields, Severity};

/// Names of the fixed (first-class) fields of a normalized record
///
/// A dynamic-field map never contains one of these names.
pub const FIXED_FIELDS: [&str; 13] = [
    "occurred_at",
    "severity",
    "free_text",
    "app",
    "environment",
    "correlation_id",
    "job_correlation_id",
    "duration",
    "status_code",
    "route_controller",
    "route_action",
    "route_path",
    "http_method",
];

/// Structured output of parsing one raw event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Id of the raw event this record was parsed from (0 until assigned)
    pub raw_event_id: i64,
    /// Event time as reported by the producer (or parse time as fallback)
    pub occurred_at: DateTime<Utc>,
    /// Normalized severity
    pub severity: Severity,
    /// Human-readable message
    pub free_text: Option<String>,
    /// Application / service name
    pub app: Option<String>,
    /// Deployment environment
    pub environment: Option<String>,
    /// Request correlation id
    pub correlation_id: Option<String>,
    /// Background job correlation id
    pub job_correlation_id: Option<String>,
    /// Duration in milliseconds
    pub duration: Option<f64>,
    /// HTTP status code
    pub status_code: Option<i64>,
    /// Routing controller
    pub route_controller: Option<String>,
    /// Routing action
    pub route_action: Option<String>,
    /// Request path
    pub route_path: Option<String>,
    /// HTTP method (uppercased)
    pub http_method: Option<String>,
    /// Every remaining top-level key of the payload
    pub dynamic_fields: DynamicFields,
}

impl NormalizedRecord {
    /// Create an empty record with only the required fields
    pub fn new(occurred_at: DateTime<Utc>, severity: Severity) -> Self {
        Self {
            raw_event_id: 0,
            occurred_at,
            severity,
            free_text: None,
            app: None,
            environment: None,
            correlation_id: None,
            job_correlation_id: None,
            duration: None,
            status_code: None,
            route_controller: None,
            route_action: None,
            route_path: None,
            http_method: None,
            dynamic_fields: DynamicFields::new(),
        }
    }

    /// Dynamic fields serialized as a JSON object string
    pub fn dynamic_fields_json(&self) -> String {
        serde_json::Value::Object(self.dynamic_fields.clone()).to_string()
    }
}
