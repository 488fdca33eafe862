//! Tests for the shared data model

use super::*;
use chrono::{TimeZone, Utc};
use serde_json::json;

// ============================================================================
// Severity
// ============================================================================

#[test]
fn test_severity_parse_case_insensitive() {
    assert_eq!(Severity::parse("INFO"), Some(Severity::Info));
    assert_eq!(Severity::parse("Warning"), Some(Severity::Warn));
    assert_eq!(Severity::parse(" error "), Some(Severity::Error));
    assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Fatal));
    assert_eq!(Severity::parse("trace"), Some(Severity::Debug));
}

#[test]
fn test_severity_parse_unrecognized() {
    assert_eq!(Severity::parse("loud"), None);
    assert_eq!(Severity::parse(""), None);
}

#[test]
fn test_severity_roundtrip_names() {
    for severity in Severity::ALL {
        assert_eq!(Severity::parse(severity.as_str()), Some(severity));
    }
}

#[test]
fn test_severity_serde_lowercase() {
    let json = serde_json::to_string(&Severity::Fatal).unwrap();
    assert_eq!(json, "\"fatal\"");
}

// ============================================================================
// FieldType
// ============================================================================

#[test]
fn test_field_type_infer_scalars() {
    assert_eq!(FieldType::infer(&json!(42)), Some(FieldType::Number));
    assert_eq!(FieldType::infer(&json!(1.5)), Some(FieldType::Number));
    assert_eq!(FieldType::infer(&json!(true)), Some(FieldType::Boolean));
    assert_eq!(FieldType::infer(&json!("hello")), Some(FieldType::String));
}

#[test]
fn test_field_type_infer_datetime_strings() {
    assert_eq!(
        FieldType::infer(&json!("2024-03-01T10:00:00Z")),
        Some(FieldType::Datetime)
    );
    assert_eq!(
        FieldType::infer(&json!("2024-03-01 10:00:00")),
        Some(FieldType::Datetime)
    );
    assert_eq!(FieldType::infer(&json!("2024-03-01")), Some(FieldType::Datetime));
    assert_eq!(FieldType::infer(&json!("2024-13-45")), Some(FieldType::String));
    assert_eq!(FieldType::infer(&json!("12345678901")), Some(FieldType::String));
}

#[test]
fn test_field_type_infer_containers_and_null() {
    assert_eq!(FieldType::infer(&json!([1, 2])), Some(FieldType::Array));
    assert_eq!(FieldType::infer(&json!({"a": 1})), Some(FieldType::Object));
    assert_eq!(FieldType::infer(&json!(null)), None);
}

#[test]
fn test_field_type_scalar_classification() {
    assert!(FieldType::String.is_scalar());
    assert!(FieldType::Datetime.is_scalar());
    assert!(!FieldType::Array.is_scalar());
    assert!(!FieldType::Object.is_scalar());
}

#[test]
fn test_field_type_parse_names() {
    for ty in [
        FieldType::String,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Datetime,
        FieldType::Array,
        FieldType::Object,
    ] {
        assert_eq!(FieldType::parse(ty.as_str()), Some(ty));
    }
    assert_eq!(FieldType::parse("blob"), None);
}

// ============================================================================
// Records and events
// ============================================================================

#[test]
fn test_dynamic_fields_json() {
    let mut record = NormalizedRecord::new(Utc::now(), Severity::Info);
    record.dynamic_fields.insert("user_id".into(), json!(42));
    assert_eq!(record.dynamic_fields_json(), r#"{"user_id":42}"#);
}

#[test]
fn test_fixed_fields_are_unique() {
    let mut names = FIXED_FIELDS.to_vec();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), FIXED_FIELDS.len());
}

#[test]
fn test_new_raw_event_builder() {
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let event = NewRawEvent::new(b"{}".to_vec())
        .with_source_token("key_1")
        .with_received_at(at);
    assert_eq!(event.source_token.as_deref(), Some("key_1"));
    assert_eq!(event.received_at, at);
}

#[test]
fn test_millis_roundtrip() {
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(time::from_millis(time::to_millis(at)), at);
    assert_eq!(time::from_millis_opt(None), None);
}
