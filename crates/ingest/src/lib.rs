//! Silt ingest - producer side of the pipeline
//!
//! [`BufferedWriter`] batches submissions into the raw store with size,
//! interval and severity-triggered flushes. [`IngestLayer`] plugs the writer
//! into `tracing` so an application's own log events become raw events.
//!
//! The writer never returns an error to a producer: store failures are
//! logged (rate-limited) and the batch stays in memory for the next flush.

mod event;
mod layer;
mod metrics;
mod rate_limited_logger;
mod writer;

pub use event::{IngestEvent, Payload};
pub use layer::{DEFAULT_EXCLUDED_PREFIXES, IngestLayer};
pub use metrics::{IngestMetrics, IngestMetricsSnapshot};
pub use rate_limited_logger::RateLimitedLogger;
pub use writer::BufferedWriter;
