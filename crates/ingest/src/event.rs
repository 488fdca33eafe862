//! Producer-side event shapes

use silt_normalize::severity_of;
use silt_protocol::{Map, Severity, Value};

/// Payload handed to the writer
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Already serialized bytes, expected to be a JSON object
    Raw(Vec<u8>),
    /// Structured key-value map
    Structured(Map<String, Value>),
}

/// One producer submission
#[derive(Debug, Clone, PartialEq)]
pub struct IngestEvent {
    pub payload: Payload,
    pub source_token: Option<String>,
}

impl IngestEvent {
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Payload::Raw(bytes.into()),
            source_token: None,
        }
    }

    pub fn structured(map: Map<String, Value>) -> Self {
        Self {
            payload: Payload::Structured(map),
            source_token: None,
        }
    }

    pub fn with_source_token(mut self, token: impl Into<String>) -> Self {
        self.source_token = Some(token.into());
        self
    }

    /// Serialize for storage and resolve the severity used for eager flush
    ///
    /// Raw payloads that are not a JSON object are wrapped as
    /// `{"message": <text>}` instead of being rejected.
    pub(crate) fn prepare(self) -> Prepared {
        let (bytes, severity, wrapped) = match self.payload {
            Payload::Raw(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => (bytes, severity_of(&map), false),
                _ => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    (wrap_text(text), Severity::Info, true)
                }
            },
            Payload::Structured(map) => {
                let severity = severity_of(&map);
                (Value::Object(map).to_string().into_bytes(), severity, false)
            }
        };

        Prepared {
            bytes,
            source_token: self.source_token,
            severity,
            wrapped,
        }
    }
}

fn wrap_text(text: String) -> Vec<u8> {
    let mut map = Map::new();
    map.insert("message".into(), Value::String(text));
    Value::Object(map).to_string().into_bytes()
}

/// Serialized submission ready for the buffer
#[derive(Debug)]
pub(crate) struct Prepared {
    pub bytes: Vec<u8>,
    pub source_token: Option<String>,
    pub severity: Severity,
    pub wrapped: bool,
}

impl From<&str> for IngestEvent {
    fn from(text: &str) -> Self {
        Self::raw(text.as_bytes())
    }
}

impl From<String> for IngestEvent {
    fn from(text: String) -> Self {
        Self::raw(text.into_bytes())
    }
}

impl From<Vec<u8>> for IngestEvent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::raw(bytes)
    }
}

impl From<Map<String, Value>> for IngestEvent {
    fn from(map: Map<String, Value>) -> Self {
        Self::structured(map)
    }
}

impl From<Value> for IngestEvent {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::structured(map),
            other => Self::raw(other.to_string().into_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_object_kept_verbatim() {
        let prepared = IngestEvent::from(r#"{"level":"ERROR","message":"boom"}"#).prepare();
        assert_eq!(prepared.bytes, br#"{"level":"ERROR","message":"boom"}"#);
        assert_eq!(prepared.severity, Severity::Error);
        assert!(!prepared.wrapped);
    }

    #[test]
    fn test_malformed_raw_is_wrapped() {
        let prepared = IngestEvent::from("plain text line {").prepare();
        let value: Value = serde_json::from_slice(&prepared.bytes).unwrap();
        assert_eq!(value, json!({"message": "plain text line {"}));
        assert_eq!(prepared.severity, Severity::Info);
        assert!(prepared.wrapped);
    }

    #[test]
    fn test_non_object_json_is_wrapped() {
        let prepared = IngestEvent::from(json!([1, 2])).prepare();
        let value: Value = serde_json::from_slice(&prepared.bytes).unwrap();
        assert_eq!(value, json!({"message": "[1,2]"}));
        assert!(prepared.wrapped);
    }

    #[test]
    fn test_structured_serialized() {
        let event = IngestEvent::from(json!({"severity": "fatal", "user_id": 1}))
            .with_source_token("key-7");
        let prepared = event.prepare();

        let value: Value = serde_json::from_slice(&prepared.bytes).unwrap();
        assert_eq!(value["user_id"], 1);
        assert_eq!(prepared.severity, Severity::Fatal);
        assert_eq!(prepared.source_token.as_deref(), Some("key-7"));
    }

    #[test]
    fn test_invalid_utf8_is_wrapped_lossy() {
        let prepared = IngestEvent::raw(vec![0xff, b'o', b'k']).prepare();
        let value: Value = serde_json::from_slice(&prepared.bytes).unwrap();
        assert!(value["message"].as_str().unwrap().ends_with("ok"));
    }
}
