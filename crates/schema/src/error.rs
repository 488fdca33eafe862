//! Registry error types

use silt_store::StoreError;
use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Persisting or reading statistics failed
    #[error("field statistics store error: {0}")]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// Whether the underlying failure is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
        }
    }
}
