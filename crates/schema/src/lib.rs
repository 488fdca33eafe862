//! Silt schema - adaptive registry for dynamic fields
//!
//! Every dynamic field seen by a parse pass is counted in a Field Statistic.
//! The registry ranks frequently used, recently seen, scalar-typed fields as
//! promotion candidates for a downstream schema migration.
//!
//! # Example
//!
//! ```ignore
//! let registry = SchemaRegistry::new(store, config.schema.clone());
//! registry.track("user_id", &json!(42)).await?;
//!
//! for candidate in registry.analyze(1000).await? {
//!     println!("{} {:.1}", candidate.field.name, candidate.priority);
//! }
//! ```

mod error;
pub mod scoring;

pub use error::{RegistryError, Result};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use silt_config::SchemaConfig;
use silt_protocol::{FieldStatistic, FieldType, NormalizedRecord, Value};
use silt_store::{FieldObservation, Store};
use tracing::{debug, info};

/// A field recommended for promotion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionCandidate {
    pub field: FieldStatistic,
    /// Priority in `0.0..=100.0`
    pub priority: f64,
}

#[derive(Debug, Clone, Copy)]
struct CachedType {
    field_type: FieldType,
    touched: Instant,
}

/// Field statistics registry
pub struct SchemaRegistry {
    store: Arc<dyn Store>,
    config: SchemaConfig,
    types: RwLock<HashMap<String, CachedType>>,
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn Store>, config: SchemaConfig) -> Self {
        Self {
            store,
            config,
            types: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Count one occurrence of a dynamic field
    ///
    /// Returns `false` without touching the store for `null` values, which
    /// carry no type.
    pub async fn track(&self, name: &str, value: &Value) -> Result<bool> {
        let Some(field_type) = self.resolve_type(name, value) else {
            return Ok(false);
        };

        let observation = FieldObservation::new(name, field_type, Utc::now());
        self.store.increment_fields(&[observation]).await?;
        Ok(true)
    }

    /// Count every dynamic field in a parse batch
    ///
    /// Occurrences are aggregated per name and applied as one atomic
    /// increment each. Returns the number of distinct names tracked.
    pub async fn track_batch(&self, records: &[NormalizedRecord]) -> Result<usize> {
        let now = Utc::now();
        let mut counts: HashMap<&str, (FieldType, u64)> = HashMap::new();

        for record in records {
            for (name, value) in &record.dynamic_fields {
                if value.is_null() {
                    continue;
                }
                if let Some(entry) = counts.get_mut(name.as_str()) {
                    entry.1 += 1;
                } else if let Some(field_type) = self.resolve_type(name, value) {
                    counts.insert(name.as_str(), (field_type, 1));
                }
            }
        }

        if counts.is_empty() {
            return Ok(0);
        }

        let mut observations: Vec<FieldObservation> = counts
            .into_iter()
            .map(|(name, (field_type, count))| {
                FieldObservation::new(name, field_type, now).with_count(count)
            })
            .collect();
        // stable lock order across concurrent workers
        observations.sort_by(|a, b| a.name.cmp(&b.name));

        self.store.increment_fields(&observations).await?;
        debug!(records = records.len(), fields = observations.len(), "tracked batch");
        Ok(observations.len())
    }

    /// Cached type if known, otherwise infer and cache
    fn resolve_type(&self, name: &str, value: &Value) -> Option<FieldType> {
        if value.is_null() {
            return None;
        }

        if let Some(cached) = self.types.write().get_mut(name) {
            cached.touched = Instant::now();
            return Some(cached.field_type);
        }

        let field_type = FieldType::infer(value)?;
        self.types.write().entry(name.to_string()).or_insert(CachedType {
            field_type,
            touched: Instant::now(),
        });
        Some(field_type)
    }

    /// Drop cache entries not used for `ttl`, returning how many were dropped
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut types = self.types.write();
        let before = types.len();
        types.retain(|_, cached| cached.touched.elapsed() < ttl);
        before - types.len()
    }

    /// [`evict_idle`](Self::evict_idle) with the configured `cache_ttl`
    pub fn evict_expired(&self) -> usize {
        self.evict_idle(self.config.cache_ttl)
    }

    /// Number of cached field types
    pub fn cached_types(&self) -> usize {
        self.types.read().len()
    }

    /// All statistics, ordered by name
    pub async fn fields(&self) -> Result<Vec<FieldStatistic>> {
        Ok(self.store.list_fields().await?)
    }

    /// Rank non-promoted, recently seen fields used more than `threshold` times
    pub async fn analyze(&self, threshold: u64) -> Result<Vec<PromotionCandidate>> {
        self.analyze_at(threshold, Utc::now()).await
    }

    /// [`analyze`](Self::analyze) against a fixed clock
    pub async fn analyze_at(
        &self,
        threshold: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionCandidate>> {
        let window = chrono::Duration::from_std(self.config.recency_window)
            .unwrap_or(chrono::Duration::MAX);
        let oldest = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut candidates: Vec<PromotionCandidate> = self
            .store
            .list_fields()
            .await?
            .into_iter()
            .filter(|f| !f.promoted && f.usage_count > threshold && f.last_seen_at >= oldest)
            .map(|field| PromotionCandidate {
                priority: scoring::priority(&field, threshold, now),
                field,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.field.name.cmp(&b.field.name))
        });
        Ok(candidates)
    }

    /// Promote every candidate above the configured cutoff, returning how many were promoted
    pub async fn auto_promote(&self, threshold: u64) -> Result<u64> {
        let cutoff = self.config.auto_promote_cutoff;
        let names: Vec<String> = self
            .analyze(threshold)
            .await?
            .into_iter()
            .filter(|c| c.priority > cutoff)
            .map(|c| c.field.name)
            .collect();

        if names.is_empty() {
            return Ok(0);
        }

        let promoted = self.store.mark_promoted(&names).await?;
        info!(promoted, cutoff, "auto-promoted fields");
        Ok(promoted)
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
