//! Dynamic-field type inference and statistics

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Runtime shape of a dynamic-field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Datetime,
    Array,
    Object,
}

impl FieldType {
    /// Infer the type of a JSON value
    ///
    /// Strings that parse as dates are classified as `Datetime`.
    /// `null` carries no type information and yields `None`.
    pub fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(_) => Some(Self::Number),
            Value::String(s) if looks_like_datetime(s) => Some(Self::Datetime),
            Value::String(_) => Some(Self::String),
            Value::Array(_) => Some(Self::Array),
            Value::Object(_) => Some(Self::Object),
        }
    }

    /// Parse from the stored name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "datetime" => Some(Self::Datetime),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// Get string representation
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Scalar types map directly onto a relational column
    #[inline]
    pub const fn is_scalar(self) -> bool {
        !matches!(self, Self::Array | Self::Object)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt to read a string as a date or timestamp
fn looks_like_datetime(s: &str) -> bool {
    // Cheap reject: every accepted format starts with a 4-digit year
    let bytes = s.as_bytes();
    if bytes.len() < 10 || !bytes[..4].iter().all(u8::is_ascii_digit) {
        return false;
    }
    DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Usage statistics for one dynamic-field name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistic {
    /// Field name (unique)
    pub name: String,
    /// Type inferred on first sight (never overwritten)
    pub inferred_type: FieldType,
    /// Number of occurrences ever observed
    pub usage_count: u64,
    /// First observation
    pub first_seen_at: DateTime<Utc>,
    /// Most recent observation
    pub last_seen_at: DateTime<Utc>,
    /// Marked for promotion to a first-class column
    pub promoted: bool,
}
