//! Parse worker
//!
//! One pass: claim a batch of raw events, normalize each payload on its own,
//! update the registry, persist the records, then mark the whole batch
//! complete. Unparseable payloads produce no record but are still completed,
//! so they are never retried automatically.
//!
//! If any store step fails the pass returns an error and the batch stays
//! claimed without `processed_at`; the cleanup task's stale-claim release
//! hands it out again later.

use std::sync::Arc;

use serde::Serialize;
use silt_normalize::Normalizer;
use silt_schema::SchemaRegistry;
use silt_store::Store;
use tracing::{debug, warn};

use crate::error::Result;

/// Outcome of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    /// Raw events claimed
    pub claimed: usize,
    /// Records produced and persisted
    pub parsed: usize,
    /// Payloads that were not a JSON object
    pub malformed: usize,
    /// Distinct dynamic field names tracked
    pub fields_tracked: usize,
}

impl ParseReport {
    fn absorb(&mut self, other: ParseReport) {
        self.claimed += other.claimed;
        self.parsed += other.parsed;
        self.malformed += other.malformed;
        self.fields_tracked += other.fields_tracked;
    }
}

pub struct ParseWorker {
    store: Arc<dyn Store>,
    registry: Arc<SchemaRegistry>,
    normalizer: Normalizer,
    claim_batch_size: usize,
}

impl ParseWorker {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SchemaRegistry>,
        claim_batch_size: usize,
    ) -> Self {
        Self {
            store,
            registry,
            normalizer: Normalizer::new(),
            claim_batch_size: claim_batch_size.max(1),
        }
    }

    pub fn claim_batch_size(&self) -> usize {
        self.claim_batch_size
    }

    /// Run a single claim-normalize-persist pass
    pub async fn run_once(&self) -> Result<ParseReport> {
        let events = self.store.claim(self.claim_batch_size).await?;
        if events.is_empty() {
            return Ok(ParseReport::default());
        }

        let mut report = ParseReport {
            claimed: events.len(),
            ..Default::default()
        };

        let mut records = Vec::with_capacity(events.len());
        let mut ids = Vec::with_capacity(events.len());
        for event in &events {
            ids.push(event.id);
            match self.normalizer.normalize(&event.payload) {
                Some(mut record) => {
                    record.raw_event_id = event.id;
                    records.push(record);
                }
                None => {
                    report.malformed += 1;
                    warn!(
                        raw_event_id = event.id,
                        bytes = event.payload.len(),
                        "unparseable payload, completing without a record"
                    );
                }
            }
        }

        report.fields_tracked = self.registry.track_batch(&records).await?;
        self.store.insert_records(&records).await?;
        report.parsed = records.len();
        self.store.complete(&ids).await?;

        debug!(
            claimed = report.claimed,
            parsed = report.parsed,
            malformed = report.malformed,
            fields = report.fields_tracked,
            "parse pass complete"
        );
        Ok(report)
    }

    /// Repeat passes until a claim comes back short or `max_passes` is reached
    pub async fn drain(&self, max_passes: usize) -> Result<ParseReport> {
        let mut total = ParseReport::default();
        for _ in 0..max_passes {
            let report = self.run_once().await?;
            total.absorb(report);
            if report.claimed < self.claim_batch_size {
                break;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_config::SchemaConfig;
    use silt_protocol::{NewRawEvent, Severity};
    use silt_store::MemoryStore;

    fn worker(batch: usize) -> (Arc<MemoryStore>, ParseWorker) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SchemaRegistry::new(store.clone(), SchemaConfig::default()));
        (store.clone(), ParseWorker::new(store, registry, batch))
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let (_store, worker) = worker(10);
        assert_eq!(worker.run_once().await.unwrap(), ParseReport::default());
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_abort_batch() {
        let (store, worker) = worker(10);
        store
            .append(&[
                NewRawEvent::new(r#"{"level":"warn","msg":"first","region":"eu"}"#),
                NewRawEvent::new("{truncated"),
                NewRawEvent::new(r#"{"level":"error","message":"third"}"#),
            ])
            .await
            .unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.claimed, 3);
        assert_eq!(report.parsed, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.fields_tracked, 1);

        let records = store.fetch_records(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw_event_id, 1);
        assert_eq!(records[0].severity, Severity::Warn);
        assert_eq!(records[1].raw_event_id, 3);
        assert_eq!(records[1].free_text.as_deref(), Some("third"));

        // the malformed event is completed too, never retried
        let malformed = store.raw_event(2).unwrap();
        assert!(malformed.claimed);
        assert!(malformed.processed_at.is_some());
        assert!(worker.run_once().await.unwrap().claimed == 0);
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_error() {
        let (store, worker) = worker(10);
        store.append(&[NewRawEvent::new(r#"{"a":1}"#)]).await.unwrap();

        store.set_available(false);
        let err = worker.run_once().await.unwrap_err();
        assert!(err.is_transient());
        store.set_available(true);

        // nothing was claimed, so the next pass picks it up
        assert_eq!(worker.run_once().await.unwrap().parsed, 1);
    }

    #[tokio::test]
    async fn test_drain_runs_until_short_claim() {
        let (store, worker) = worker(2);
        let batch: Vec<_> = (0..5).map(|i| NewRawEvent::new(format!(r#"{{"n":{i}}}"#))).collect();
        store.append(&batch).await.unwrap();

        let report = worker.drain(10).await.unwrap();
        assert_eq!(report.claimed, 5);
        assert_eq!(report.parsed, 5);
        assert_eq!(store.pending_count().await.unwrap(), 0);

        let fields = store.list_fields().await.unwrap();
        assert_eq!(fields[0].name, "n");
        assert_eq!(fields[0].usage_count, 5);
    }

    #[tokio::test]
    async fn test_drain_respects_max_passes() {
        let (store, worker) = worker(1);
        let batch: Vec<_> = (0..4).map(|_| NewRawEvent::new("{}")).collect();
        store.append(&batch).await.unwrap();

        assert_eq!(worker.drain(2).await.unwrap().claimed, 2);
        assert_eq!(store.pending_count().await.unwrap(), 2);
    }
}
