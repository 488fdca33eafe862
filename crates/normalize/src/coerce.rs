//! Value coercions for fixed fields

use serde_json::Value;
use silt_protocol::Severity;

/// Case-fold a severity name onto the fixed set
///
/// Unrecognized names read as `Info`, not `Unknown`.
pub fn normalize_severity(name: &str) -> Severity {
    Severity::parse(name).unwrap_or(Severity::Info)
}

pub(crate) fn severity_value(value: &Value) -> Option<Severity> {
    match value {
        Value::String(s) => Some(normalize_severity(s)),
        Value::Number(n) => Some(normalize_severity(&n.to_string())),
        _ => None,
    }
}

/// Message text; structured messages are kept as their JSON rendering
pub(crate) fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Strings, numbers and booleans as text; containers are not usable
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
