//! Silt store - durable raw event queue and normalized record storage
//!
//! Three backends implement the same [`Store`] contract:
//!
//! - [`SqliteStore`]: file-backed, claims through a serialized
//!   `BEGIN IMMEDIATE` transaction
//! - [`PostgresStore`]: claims with `FOR UPDATE SKIP LOCKED` when the server
//!   supports it, otherwise through an advisory-locked two-phase transaction
//! - [`MemoryStore`]: process-local, for tests and throwaway runs
//!
//! The claim strategy is chosen once when the store opens, never per call.
//!
//! # Claim contract
//!
//! A raw event is handed out by [`Store::claim`] at most once. Claimed events
//! are ordered by `(received_at, id)` and carry `claimed = true`. Events that
//! were claimed but never [`completed`](Store::complete) can be put back with
//! [`Store::release_stale`].

mod error;
mod memory;
mod postgres;
pub mod retry;
mod rows;
mod sqlite;

#[cfg(test)]
mod conformance;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::{ClaimStrategy, PostgresStore};
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use silt_config::{StoreBackend, StoreConfig};
use silt_protocol::{FieldStatistic, FieldType, NewRawEvent, NormalizedRecord, RawEvent};

/// Rows per multi-row statement; keeps bind counts under driver limits
pub(crate) const MAX_ROWS_PER_STATEMENT: usize = 500;

/// One aggregated usage increment for a dynamic field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldObservation {
    pub name: String,
    /// Type recorded on first insert only; never overwrites a stored type
    pub inferred_type: FieldType,
    pub count: u64,
    pub seen_at: DateTime<Utc>,
}

impl FieldObservation {
    pub fn new(name: impl Into<String>, inferred_type: FieldType, seen_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            inferred_type,
            count: 1,
            seen_at,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }
}

/// Rows removed by a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub raw_events: u64,
    pub records: u64,
}

/// Storage contract shared by all backends
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether claims run as a single select-lock-update pass
    fn supports_skip_locked(&self) -> bool;

    /// Persist a batch of raw events atomically, returning ids in input order
    async fn append(&self, events: &[NewRawEvent]) -> Result<Vec<i64>>;

    /// Exclusively claim up to `limit` unclaimed events, oldest first
    async fn claim(&self, limit: usize) -> Result<Vec<RawEvent>>;

    /// Mark claimed events as fully processed
    async fn complete(&self, ids: &[i64]) -> Result<u64>;

    /// Return events claimed before `claimed_before` and never completed to the queue
    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64>;

    /// Number of events waiting to be claimed
    async fn pending_count(&self) -> Result<u64>;

    /// Persist normalized records; a record for an already-recorded raw event is skipped
    async fn insert_records(&self, records: &[NormalizedRecord]) -> Result<u64>;

    /// Read back normalized records in raw event order
    async fn fetch_records(&self, limit: usize) -> Result<Vec<NormalizedRecord>>;

    /// Atomically add usage for each observation
    ///
    /// Creates the statistic when absent. Existing rows keep their type and
    /// first-seen time; last-seen only moves forward.
    async fn increment_fields(&self, observations: &[FieldObservation]) -> Result<()>;

    /// All field statistics, ordered by name
    async fn list_fields(&self) -> Result<Vec<FieldStatistic>>;

    /// Flag fields as promoted, returning how many changed
    async fn mark_promoted(&self, names: &[String]) -> Result<u64>;

    /// Delete raw events received and records occurring before `cutoff`
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport>;

    /// Release connections
    async fn close(&self) {}
}

/// Open the backend selected by the configured URL
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    let backend = config
        .backend()
        .map_err(|e| StoreError::invalid_url(&config.url, e.to_string()))?;

    let store: Arc<dyn Store> = match backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(config).await?),
        StoreBackend::Postgres => Arc::new(PostgresStore::open(config).await?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    tracing::info!(
        backend = store.name(),
        skip_locked = store.supports_skip_locked(),
        "store opened"
    );
    Ok(store)
}
