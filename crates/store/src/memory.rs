//! In-memory backend
//!
//! All state sits behind one mutex, so every operation is trivially atomic.
//! [`MemoryStore::set_available`] simulates an outage for failure-path tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use silt_protocol::{FieldStatistic, NewRawEvent, NormalizedRecord, RawEvent};

use crate::error::{Result, StoreError};
use crate::rows::sort_queue_order;
use crate::{FieldObservation, PurgeReport, Store};

#[derive(Default)]
struct State {
    next_id: i64,
    raw_events: BTreeMap<i64, RawEvent>,
    records: BTreeMap<i64, NormalizedRecord>,
    fields: BTreeMap<String, FieldStatistic>,
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle a simulated outage; while unavailable every call fails transiently
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Snapshot of a raw event by id
    pub fn raw_event(&self, id: i64) -> Option<RawEvent> {
        self.state.lock().raw_events.get(&id).cloned()
    }

    /// Total raw events held, claimed or not
    pub fn raw_event_count(&self) -> usize {
        self.state.lock().raw_events.len()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn supports_skip_locked(&self) -> bool {
        true
    }

    async fn append(&self, events: &[NewRawEvent]) -> Result<Vec<i64>> {
        self.check()?;
        let mut state = self.state.lock();
        let mut ids = Vec::with_capacity(events.len());

        for event in events {
            state.next_id += 1;
            let id = state.next_id;
            state.raw_events.insert(
                id,
                RawEvent {
                    id,
                    payload: event.payload.clone(),
                    source_token: event.source_token.clone(),
                    received_at: event.received_at,
                    claimed: false,
                    claimed_at: None,
                    processed_at: None,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn claim(&self, limit: usize) -> Result<Vec<RawEvent>> {
        self.check()?;
        let now = Utc::now();
        let mut state = self.state.lock();

        let mut candidates: Vec<(DateTime<Utc>, i64)> = state
            .raw_events
            .values()
            .filter(|e| !e.claimed)
            .map(|e| (e.received_at, e.id))
            .collect();
        candidates.sort_unstable();
        candidates.truncate(limit);

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(event) = state.raw_events.get_mut(&id) {
                event.claimed = true;
                event.claimed_at = Some(now);
                claimed.push(event.clone());
            }
        }
        sort_queue_order(&mut claimed);
        Ok(claimed)
    }

    async fn complete(&self, ids: &[i64]) -> Result<u64> {
        self.check()?;
        let now = Utc::now();
        let mut state = self.state.lock();
        let mut updated = 0;

        for id in ids {
            if let Some(event) = state.raw_events.get_mut(id)
                && event.claimed
                && event.processed_at.is_none()
            {
                event.processed_at = Some(now);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        self.check()?;
        let mut state = self.state.lock();
        let mut released = 0;

        for event in state.raw_events.values_mut() {
            if event.claimed
                && event.processed_at.is_none()
                && event.claimed_at.is_some_and(|at| at < claimed_before)
            {
                event.claimed = false;
                event.claimed_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn pending_count(&self) -> Result<u64> {
        self.check()?;
        let state = self.state.lock();
        Ok(state.raw_events.values().filter(|e| !e.claimed).count() as u64)
    }

    async fn insert_records(&self, records: &[NormalizedRecord]) -> Result<u64> {
        self.check()?;
        let mut state = self.state.lock();
        let mut inserted = 0;

        for record in records {
            if !state.records.contains_key(&record.raw_event_id) {
                state.records.insert(record.raw_event_id, record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn fetch_records(&self, limit: usize) -> Result<Vec<NormalizedRecord>> {
        self.check()?;
        let state = self.state.lock();
        Ok(state.records.values().take(limit).cloned().collect())
    }

    async fn increment_fields(&self, observations: &[FieldObservation]) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();

        for obs in observations {
            state
                .fields
                .entry(obs.name.clone())
                .and_modify(|stat| {
                    stat.usage_count = stat.usage_count.saturating_add(obs.count);
                    stat.last_seen_at = stat.last_seen_at.max(obs.seen_at);
                })
                .or_insert_with(|| FieldStatistic {
                    name: obs.name.clone(),
                    inferred_type: obs.inferred_type,
                    usage_count: obs.count,
                    first_seen_at: obs.seen_at,
                    last_seen_at: obs.seen_at,
                    promoted: false,
                });
        }
        Ok(())
    }

    async fn list_fields(&self) -> Result<Vec<FieldStatistic>> {
        self.check()?;
        Ok(self.state.lock().fields.values().cloned().collect())
    }

    async fn mark_promoted(&self, names: &[String]) -> Result<u64> {
        self.check()?;
        let mut state = self.state.lock();
        let mut updated = 0;

        for name in names {
            if let Some(stat) = state.fields.get_mut(name)
                && !stat.promoted
            {
                stat.promoted = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        self.check()?;
        let mut state = self.state.lock();

        let raw_before = state.raw_events.len();
        state.raw_events.retain(|_, e| e.received_at >= cutoff);
        let records_before = state.records.len();
        state.records.retain(|_, r| r.occurred_at >= cutoff);

        Ok(PurgeReport {
            raw_events: (raw_before - state.raw_events.len()) as u64,
            records: (records_before - state.records.len()) as u64,
        })
    }
}
