//! Behavior every backend must share; invoked from each backend's tests

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use silt_protocol::{FieldType, NewRawEvent, NormalizedRecord, Severity, Value};

use crate::{FieldObservation, Store};

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub async fn append_and_claim_in_order(store: &dyn Store) {
    // ids ascend but receive times do not
    let ids = store
        .append(&[
            NewRawEvent::new("late").with_received_at(at(2)),
            NewRawEvent::new("early").with_received_at(at(0)),
            NewRawEvent::new("middle").with_received_at(at(1)),
        ])
        .await
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(store.pending_count().await.unwrap(), 3);

    let first = store.claim(2).await.unwrap();
    let payloads: Vec<_> = first.iter().map(|e| e.payload.clone()).collect();
    assert_eq!(payloads, vec![b"early".to_vec(), b"middle".to_vec()]);
    assert!(first.iter().all(|e| e.claimed && e.claimed_at.is_some()));

    let second = store.claim(10).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].payload, b"late");

    assert!(store.claim(10).await.unwrap().is_empty());
    assert!(store.claim(0).await.unwrap().is_empty());
    assert_eq!(store.pending_count().await.unwrap(), 0);
    assert!(store.append(&[]).await.unwrap().is_empty());
}

pub async fn claim_is_exclusive(store: Arc<dyn Store>) {
    let batch: Vec<_> = (0..200)
        .map(|i| NewRawEvent::new(format!("event-{i}")).with_received_at(at(i)))
        .collect();
    store.append(&batch).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let claimed = store.claim(7).await.unwrap();
                if claimed.is_empty() {
                    break;
                }
                mine.extend(claimed.into_iter().map(|e| e.id));
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            total += 1;
            assert!(seen.insert(id), "event {id} claimed twice");
        }
    }
    assert_eq!(total, 200);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

pub async fn complete_and_release_stale(store: &dyn Store) {
    store
        .append(&[NewRawEvent::new("a"), NewRawEvent::new("b")])
        .await
        .unwrap();
    let claimed = store.claim(2).await.unwrap();
    assert_eq!(claimed.len(), 2);

    // only the first finishes
    assert_eq!(store.complete(&[claimed[0].id]).await.unwrap(), 1);
    assert_eq!(store.complete(&[claimed[0].id]).await.unwrap(), 0);

    // nothing is older than a past cutoff
    assert_eq!(store.release_stale(Utc::now() - Duration::hours(1)).await.unwrap(), 0);

    let released = store.release_stale(Utc::now() + Duration::seconds(5)).await.unwrap();
    assert_eq!(released, 1);

    let reclaimed = store.claim(10).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, claimed[1].id);
}

pub async fn records_round_trip_and_dedupe(store: &dyn Store) {
    let mut record = NormalizedRecord::new(at(10), Severity::Warn);
    record.raw_event_id = 41;
    record.free_text = Some("disk almost full".into());
    record.app = Some("billing".into());
    record.duration = Some(12.5);
    record.status_code = Some(503);
    record.http_method = Some("POST".into());
    record
        .dynamic_fields
        .insert("user_id".into(), Value::from(42));

    let mut other = NormalizedRecord::new(at(5), Severity::Info);
    other.raw_event_id = 7;

    assert_eq!(store.insert_records(&[record.clone(), other.clone()]).await.unwrap(), 2);
    // re-processing the same raw event is a no-op
    assert_eq!(store.insert_records(&[record.clone()]).await.unwrap(), 0);
    assert_eq!(store.insert_records(&[]).await.unwrap(), 0);

    let stored = store.fetch_records(10).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].raw_event_id, 7);
    assert_eq!(stored[1], record);

    assert_eq!(store.fetch_records(1).await.unwrap().len(), 1);
}

pub async fn field_upsert_is_monotonic(store: &dyn Store) {
    store
        .increment_fields(&[FieldObservation::new("user_id", FieldType::Number, at(100))])
        .await
        .unwrap();
    // a later string value keeps the first type; an older sighting never rewinds last_seen
    store
        .increment_fields(&[
            FieldObservation::new("user_id", FieldType::String, at(50)).with_count(3),
            FieldObservation::new("region", FieldType::String, at(60)),
        ])
        .await
        .unwrap();
    store
        .increment_fields(&[FieldObservation::new("user_id", FieldType::Number, at(200))])
        .await
        .unwrap();

    let fields = store.list_fields().await.unwrap();
    let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["region", "user_id"]);

    let user = &fields[1];
    assert_eq!(user.usage_count, 5);
    assert_eq!(user.inferred_type, FieldType::Number);
    assert_eq!(user.first_seen_at, at(100));
    assert_eq!(user.last_seen_at, at(200));
    assert!(!user.promoted);
}

pub async fn promote_and_purge(store: &dyn Store) {
    store
        .increment_fields(&[
            FieldObservation::new("a", FieldType::Boolean, at(0)),
            FieldObservation::new("b", FieldType::Array, at(0)),
        ])
        .await
        .unwrap();

    let names = vec!["a".to_string(), "missing".to_string()];
    assert_eq!(store.mark_promoted(&names).await.unwrap(), 1);
    assert_eq!(store.mark_promoted(&names).await.unwrap(), 0);

    let fields = store.list_fields().await.unwrap();
    assert!(fields.iter().any(|f| f.name == "a" && f.promoted));
    assert!(fields.iter().any(|f| f.name == "b" && !f.promoted));

    store
        .append(&[
            NewRawEvent::new("old").with_received_at(at(0)),
            NewRawEvent::new("new").with_received_at(at(1000)),
        ])
        .await
        .unwrap();
    let mut old_record = NormalizedRecord::new(at(0), Severity::Info);
    old_record.raw_event_id = 1;
    store.insert_records(&[old_record]).await.unwrap();

    let report = store.purge_before(at(500)).await.unwrap();
    assert_eq!(report.raw_events, 1);
    assert_eq!(report.records, 1);
    assert_eq!(store.pending_count().await.unwrap(), 1);
    assert!(store.fetch_records(10).await.unwrap().is_empty());
}
