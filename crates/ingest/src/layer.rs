//! `tracing` layer that feeds application log events into the writer
//!
//! Events are skipped by target prefix. The defaults cover every core crate
//! and the database driver, so storage activity caused by a flush is never
//! written back through the layer.

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use silt_protocol::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::event::IngestEvent;
use crate::writer::BufferedWriter;

/// Targets never ingested
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &["silt_", "sqlx"];

pub struct IngestLayer {
    writer: Arc<BufferedWriter>,
    excluded_prefixes: Vec<String>,
    app: Option<String>,
    source_token: Option<String>,
}

impl IngestLayer {
    pub fn new(writer: Arc<BufferedWriter>) -> Self {
        Self {
            writer,
            excluded_prefixes: DEFAULT_EXCLUDED_PREFIXES.iter().map(|p| p.to_string()).collect(),
            app: None,
            source_token: None,
        }
    }

    /// Skip another target prefix as well
    pub fn exclude_target(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    /// Stamp every event with an `app` field
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_source_token(mut self, token: impl Into<String>) -> Self {
        self.source_token = Some(token.into());
        self
    }

    fn is_excluded(&self, target: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| target.starts_with(prefix.as_str()))
    }
}

impl<S: Subscriber> Layer<S> for IngestLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.is_excluded(metadata.target()) {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut fields = visitor.fields;
        fields.insert(
            "timestamp".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        fields.insert(
            "level".into(),
            Value::String(metadata.level().as_str().to_lowercase()),
        );
        fields.insert("target".into(), Value::String(metadata.target().to_string()));
        if let Some(app) = &self.app {
            fields.entry("app").or_insert_with(|| Value::String(app.clone()));
        }

        let mut submission = IngestEvent::structured(fields);
        submission.source_token = self.source_token.clone();
        self.writer.enqueue(submission);
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().into(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().into(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().into(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().into(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().into(), Value::Bool(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().into(), Value::String(format!("{value:?}")));
    }
}
