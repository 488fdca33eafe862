//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend temporarily unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be mapped back into the data model
    #[error("invalid {field} in stored row: {value}")]
    Corrupt { field: &'static str, value: String },

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad connection URL or options
    #[error("invalid store url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Filesystem error while preparing the database location
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite result codes for lock contention (primary and extended)
const SQLITE_BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// PostgreSQL SQLSTATEs worth a fresh attempt
///
/// serialization_failure, deadlock_detected, lock_not_available, query_canceled
const POSTGRES_RETRY_STATES: &[&str] = &["40001", "40P01", "55P03", "57014"];

impl StoreError {
    /// Create a corrupt-row error
    pub fn corrupt(field: &'static str, value: impl Into<String>) -> Self {
        Self::Corrupt {
            field,
            value: value.into(),
        }
    }

    /// Create an invalid-url error
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed
    ///
    /// Connection loss, pool exhaustion, lock timeouts and deadlocks are
    /// transient; constraint violations and corrupt rows are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => {
                    let code = db.code().unwrap_or_default();
                    SQLITE_BUSY_CODES.contains(&code.as_ref())
                        || POSTGRES_RETRY_STATES.contains(&code.as_ref())
                        || db.message().contains("database is locked")
                }
                _ => false,
            },
            Self::Corrupt { .. } | Self::Json(_) | Self::InvalidUrl { .. } | Self::Io(_) => false,
        }
    }
}
