//! Worker and scheduler errors

use silt_schema::RegistryError;
use silt_store::StoreError;
use thiserror::Error;

/// Result type for parse passes
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Parse pass errors
///
/// Malformed payloads are not errors; they are counted in the report.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl WorkerError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Registry(e) => e.is_transient(),
        }
    }
}

/// Errors returned by scheduled tasks
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Failure reported by a custom task
    #[error("task '{task}' failed: {message}")]
    Task { task: &'static str, message: String },
}

impl SchedulerError {
    pub fn task(task: &'static str, message: impl Into<String>) -> Self {
        Self::Task {
            task,
            message: message.into(),
        }
    }
}
