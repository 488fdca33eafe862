//! Adaptive schema registry configuration

use std::time::Duration;

use serde::Deserialize;

/// Schema registry configuration
///
/// # Example
///
/// ```toml
/// [schema]
/// promotion_threshold = 1000
/// auto_promote_cutoff = 80.0
/// recency_window = "30d"
/// cache_ttl = "1h"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Usage count a field must exceed to be a promotion candidate
    /// Default: 1000
    pub promotion_threshold: u64,

    /// Priority (0-100) above which candidates are promoted automatically
    /// Default: 80.0
    pub auto_promote_cutoff: f64,

    /// Candidates must have been seen within this window
    /// Default: 30d
    #[serde(with = "humantime_serde")]
    pub recency_window: Duration,

    /// Idle time after which cached field types are evicted
    /// Default: 1h
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 1000,
            auto_promote_cutoff: 80.0,
            recency_window: Duration::from_secs(30 * 86_400),
            cache_ttl: Duration::from_secs(3600),
        }
    }
}
