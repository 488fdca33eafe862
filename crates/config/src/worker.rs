//! Parse worker configuration

use serde::Deserialize;

/// Parse worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Raw events claimed per pass
    /// Default: 500
    pub claim_batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            claim_batch_size: 500,
        }
    }
}
