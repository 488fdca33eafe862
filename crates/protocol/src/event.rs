//! Raw event envelopes

use chrono::{DateTime, Utc};

/// A raw event ready to be appended to the store
///
/// The store assigns the `id` and the claim state.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRawEvent {
    /// Opaque serialized payload (producer-supplied schema)
    pub payload: Vec<u8>,
    /// Optional provenance reference (API key id, host, ...)
    pub source_token: Option<String>,
    /// When the event was accepted by the writer
    pub received_at: DateTime<Utc>,
}

impl NewRawEvent {
    /// Create an event received now
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            source_token: None,
            received_at: Utc::now(),
        }
    }

    /// Attach a provenance reference
    pub fn with_source_token(mut self, token: impl Into<String>) -> Self {
        self.source_token = Some(token.into());
        self
    }

    /// Override the receive time
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// A durably stored raw event
///
/// `claimed` and `claimed_at` are only ever changed together, by the store's
/// claim operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Monotonic id assigned by the store
    pub id: i64,
    /// Opaque serialized payload
    pub payload: Vec<u8>,
    /// Optional provenance reference
    pub source_token: Option<String>,
    /// Assignment time
    pub received_at: DateTime<Utc>,
    /// Whether a worker owns this event
    pub claimed: bool,
    /// When it was claimed
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the owning worker finished with it
    pub processed_at: Option<DateTime<Utc>>,
}

impl RawEvent {
    /// Payload as UTF-8 text, replacing invalid sequences
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
