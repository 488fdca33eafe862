//! Buffered ingest writer configuration

use std::time::Duration;

use serde::Deserialize;

/// Ingest writer configuration
///
/// # Example
///
/// ```toml
/// [ingest]
/// batch_size = 100
/// capacity = 10000
/// flush_interval = "5s"
/// eager_flush_levels = ["error", "fatal"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Buffered events that trigger a flush
    /// Default: 100
    pub batch_size: usize,

    /// Maximum buffered events; the oldest is evicted beyond this
    /// Default: 10000
    pub capacity: usize,

    /// Time between timer-triggered flushes
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Severities that flush the whole buffer immediately
    /// Default: ["error", "fatal"]
    pub eager_flush_levels: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            capacity: 10_000,
            flush_interval: Duration::from_secs(5),
            eager_flush_levels: vec!["error".into(), "fatal".into()],
        }
    }
}
