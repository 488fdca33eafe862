//! Silt Protocol - Core types shared by every pipeline stage
//!
//! This crate provides the data model that flows through the pipeline:
//! - `NewRawEvent` / `RawEvent` - durable envelope around a producer payload
//! - `NormalizedRecord` - fixed fields plus an open dynamic-field map
//! - `FieldStatistic` - usage/type/recency data per dynamic-field name
//! - `Severity` - the fixed severity enumeration
//! - `FieldType` - runtime shape of a dynamic-field value
//!
//! # Data Flow
//!
//! ```text
//! producer → NewRawEvent → store (RawEvent) → normalizer → NormalizedRecord
//!                                                       ↘ registry (FieldStatistic)
//! ```

mod event;
mod field;
mod record;
mod severity;
pub mod time;

pub use event::{NewRawEvent, RawEvent};
pub use field::{FieldStatistic, FieldType};
pub use record::{FIXED_FIELDS, NormalizedRecord};
pub use severity::Severity;

/// Re-export for dynamic-field maps
pub use serde_json::{Map, Value};

/// Dynamic-field map type (key → arbitrary JSON value)
pub type DynamicFields = Map<String, Value>;

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
