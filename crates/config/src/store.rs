//! Storage backend configuration

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Storage engine selected by the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `sqlite://path/to/file.db` (or `sqlite::memory:`)
    Sqlite,
    /// `postgres://` or `postgresql://`
    Postgres,
    /// `memory://` - process-local, for tests and dry runs
    Memory,
}

/// Storage configuration
///
/// # Example
///
/// ```toml
/// [store]
/// url = "sqlite://data/silt.db"
/// max_connections = 5
/// busy_timeout = "5s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URL; the scheme selects the backend
    /// Default: sqlite://data/silt.db
    pub url: String,

    /// Connection pool size
    /// Default: 5
    pub max_connections: u32,

    /// How long a connection waits on a lock before failing
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/silt.db".into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Resolve the backend from the URL scheme
    pub fn backend(&self) -> Result<StoreBackend> {
        let scheme = self
            .url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or_default();

        match scheme {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::unsupported_scheme(other)),
        }
    }
}
