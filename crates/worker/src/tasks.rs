//! Built-in scheduled tasks and the standard loop layout
//!
//! | Loop    | Cadence                    | Tasks |
//! |---------|----------------------------|-------|
//! | parse   | `parse_interval`           | [`ParseTask`] |
//! | cleanup | `cleanup_interval`         | [`CleanupTask`] |
//! | daily   | `daily_hour` (UTC), polled | [`RetentionTask`], [`PromotionTask`] |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use silt_config::SchedulerConfig;
use silt_schema::SchemaRegistry;
use silt_store::Store;
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::parse::ParseWorker;
use crate::scheduler::{ScheduledTask, Scheduler};

fn ago(duration: Duration) -> chrono::DateTime<Utc> {
    let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(delta)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
}

/// One parse pass per tick
pub struct ParseTask {
    worker: Arc<ParseWorker>,
}

impl ParseTask {
    pub fn new(worker: Arc<ParseWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl ScheduledTask for ParseTask {
    fn name(&self) -> &'static str {
        "parse"
    }

    async fn run(&self) -> Result<(), SchedulerError> {
        let report = self.worker.run_once().await?;
        if report.claimed > 0 {
            debug!(
                parsed = report.parsed,
                malformed = report.malformed,
                "parse tick"
            );
        }
        Ok(())
    }
}

/// Evicts idle registry cache entries and re-queues stale claims
pub struct CleanupTask {
    store: Arc<dyn Store>,
    registry: Arc<SchemaRegistry>,
    stale_claim_after: Duration,
}

impl CleanupTask {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SchemaRegistry>,
        stale_claim_after: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            stale_claim_after,
        }
    }
}

#[async_trait]
impl ScheduledTask for CleanupTask {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn run(&self) -> Result<(), SchedulerError> {
        let evicted = self.registry.evict_expired();
        let released = self.store.release_stale(ago(self.stale_claim_after)).await?;

        if released > 0 {
            info!(released, "released stale claims");
        }
        debug!(evicted, released, "cleanup complete");
        Ok(())
    }
}

/// Deletes raw events and records older than the retention age
pub struct RetentionTask {
    store: Arc<dyn Store>,
    retention: Duration,
}

impl RetentionTask {
    pub fn new(store: Arc<dyn Store>, retention: Duration) -> Self {
        Self { store, retention }
    }
}

#[async_trait]
impl ScheduledTask for RetentionTask {
    fn name(&self) -> &'static str {
        "retention"
    }

    async fn run(&self) -> Result<(), SchedulerError> {
        let report = self.store.purge_before(ago(self.retention)).await?;
        info!(
            raw_events = report.raw_events,
            records = report.records,
            "retention purge complete"
        );
        Ok(())
    }
}

/// Flags high-priority fields as promoted
pub struct PromotionTask {
    registry: Arc<SchemaRegistry>,
}

impl PromotionTask {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ScheduledTask for PromotionTask {
    fn name(&self) -> &'static str {
        "promotion"
    }

    async fn run(&self) -> Result<(), SchedulerError> {
        let threshold = self.registry.config().promotion_threshold;
        let promoted = self.registry.auto_promote(threshold).await?;
        info!(promoted, threshold, "promotion analysis complete");
        Ok(())
    }
}

/// Scheduler with the parse, cleanup and daily loops registered
pub fn standard_scheduler(
    config: &SchedulerConfig,
    store: Arc<dyn Store>,
    registry: Arc<SchemaRegistry>,
    worker: Arc<ParseWorker>,
) -> Scheduler {
    Scheduler::new(config.stop_grace)
        .every("parse", config.parse_interval, Arc::new(ParseTask::new(worker)))
        .every(
            "cleanup",
            config.cleanup_interval,
            Arc::new(CleanupTask::new(
                Arc::clone(&store),
                Arc::clone(&registry),
                config.stale_claim_after,
            )),
        )
        .daily(
            "daily",
            config.daily_hour,
            config.daily_poll_interval,
            vec![
                Arc::new(RetentionTask::new(store, config.retention)) as Arc<dyn ScheduledTask>,
                Arc::new(PromotionTask::new(registry)),
            ],
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use silt_config::SchemaConfig;
    use silt_protocol::{FieldType, NewRawEvent};
    use silt_store::{FieldObservation, MemoryStore};

    fn components() -> (Arc<MemoryStore>, Arc<SchemaRegistry>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SchemaRegistry::new(store.clone(), SchemaConfig::default()));
        (store, registry)
    }

    #[tokio::test]
    async fn test_parse_task_runs_a_pass() {
        let (store, registry) = components();
        store.append(&[NewRawEvent::new(r#"{"k":"v"}"#)]).await.unwrap();

        let worker = Arc::new(ParseWorker::new(store.clone(), registry, 10));
        ParseTask::new(worker).run().await.unwrap();

        assert_eq!(store.fetch_records(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_releases_only_stale_claims() {
        let (store, registry) = components();
        store.append(&[NewRawEvent::new("{}")]).await.unwrap();
        store.claim(1).await.unwrap();

        let patient = CleanupTask::new(store.clone(), registry.clone(), Duration::from_secs(900));
        patient.run().await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 0);

        let eager = CleanupTask::new(store.clone(), registry, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        eager.run().await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retention_purges_old_rows() {
        let (store, _registry) = components();
        store
            .append(&[
                NewRawEvent::new("{}").with_received_at(Utc::now() - ChronoDuration::days(40)),
                NewRawEvent::new("{}"),
            ])
            .await
            .unwrap();

        RetentionTask::new(store.clone(), Duration::from_secs(30 * 86_400))
            .run()
            .await
            .unwrap();
        assert_eq!(store.raw_event_count(), 1);
    }

    #[tokio::test]
    async fn test_promotion_uses_configured_threshold() {
        let (store, registry) = components();
        store
            .increment_fields(&[
                FieldObservation::new("user_id", FieldType::Number, Utc::now()).with_count(100_000),
            ])
            .await
            .unwrap();

        PromotionTask::new(registry.clone()).run().await.unwrap();
        assert!(registry.fields().await.unwrap()[0].promoted);
    }

    #[tokio::test]
    async fn test_task_errors_surface() {
        let (store, registry) = components();
        store.set_available(false);

        let err = RetentionTask::new(store.clone(), Duration::from_secs(1))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Store(_)));

        let worker = Arc::new(ParseWorker::new(store, registry, 1));
        let err = ParseTask::new(worker).run().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Worker(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_standard_scheduler_layout() {
        let (store, registry) = components();
        let worker = Arc::new(ParseWorker::new(store.clone(), registry.clone(), 10));

        let scheduler = standard_scheduler(&SchedulerConfig::default(), store, registry, worker);
        let names: Vec<_> = scheduler.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["parse", "cleanup", "retention", "promotion"]);

        scheduler.start();
        let report = scheduler.stop().await;
        assert_eq!(report.exited, 3);
    }
}
