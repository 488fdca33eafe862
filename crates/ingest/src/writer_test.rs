use super::*;
use serde_json::json;
use silt_store::MemoryStore;

fn config(batch_size: usize, capacity: usize) -> IngestConfig {
    IngestConfig {
        batch_size,
        capacity,
        flush_interval: Duration::from_secs(5),
        eager_flush_levels: vec!["error".into(), "fatal".into()],
    }
}

fn writer(batch_size: usize, capacity: usize) -> (Arc<MemoryStore>, BufferedWriter) {
    let store = Arc::new(MemoryStore::new());
    let writer = BufferedWriter::new(store.clone(), &config(batch_size, capacity));
    (store, writer)
}

fn payloads(store: &MemoryStore) -> Vec<String> {
    (1..=store.raw_event_count() as i64)
        .filter_map(|id| store.raw_event(id))
        .map(|e| e.payload_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_write_buffers_until_flush() {
    let (store, writer) = writer(100, 1000);

    writer.write(json!({"level": "info", "message": "a"})).await;
    writer.write(json!({"level": "debug", "message": "b"})).await;
    assert_eq!(writer.buffered_len(), 2);
    assert_eq!(store.raw_event_count(), 0);

    assert_eq!(writer.flush().await, 2);
    assert_eq!(writer.buffered_len(), 0);
    assert_eq!(store.raw_event_count(), 2);
    assert_eq!(writer.flush().await, 0);
}

#[tokio::test]
async fn test_critical_severity_flushes_whole_buffer() {
    let (store, writer) = writer(100, 1000);

    for i in 0..3 {
        writer.write(json!({"level": "info", "message": i})).await;
    }
    assert_eq!(store.raw_event_count(), 0);

    writer.write(json!({"level": "ERROR", "message": "disk failed"})).await;

    assert_eq!(store.raw_event_count(), 4);
    assert_eq!(writer.buffered_len(), 0);
    assert_eq!(writer.metrics().eager_flushes, 1);
}

#[tokio::test]
async fn test_eager_flush_uses_severity_aliases() {
    let (store, writer) = writer(100, 1000);
    writer.write(r#"{"severity":"critical","msg":"x"}"#).await;
    assert_eq!(store.raw_event_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_size_threshold_wakes_flusher() {
    let (store, writer) = writer(3, 1000);

    writer.write(json!({"n": 1})).await;
    writer.write(json!({"n": 2})).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.raw_event_count(), 0);

    writer.write(json!({"n": 3})).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.raw_event_count(), 3);
    assert_eq!(writer.buffered_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_interval_flushes_stragglers() {
    let (store, writer) = writer(100, 1000);

    writer.write(json!({"n": 1})).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.raw_event_count(), 0);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(store.raw_event_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_flush_restarts_interval() {
    let (store, writer) = writer(100, 1000);
    writer.write(json!({"n": 1})).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    writer.flush().await;
    assert_eq!(store.raw_event_count(), 1);

    writer.write(json!({"n": 2})).await;

    // a fixed period would have fired at 5s
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.raw_event_count(), 1);

    // 5s after the manual flush
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.raw_event_count(), 2);
}

#[tokio::test]
async fn test_capacity_evicts_oldest() {
    let (store, writer) = writer(100, 3);

    for i in 0..5 {
        writer.write(json!({"n": i})).await;
    }
    assert_eq!(writer.buffered_len(), 3);
    assert_eq!(writer.metrics().evicted, 2);

    writer.flush().await;
    assert_eq!(
        payloads(&store),
        vec![r#"{"n":2}"#, r#"{"n":3}"#, r#"{"n":4}"#]
    );
}

#[tokio::test]
async fn test_failed_flush_requeues_in_order() {
    let (store, writer) = writer(100, 1000);
    store.set_available(false);

    writer.write(json!({"n": 1})).await;
    writer.write(json!({"n": 2})).await;
    assert_eq!(writer.flush().await, 0);
    assert_eq!(writer.buffered_len(), 2);
    assert_eq!(writer.metrics().flush_failures, 1);

    writer.write(json!({"n": 3})).await;
    store.set_available(true);
    assert_eq!(writer.flush().await, 3);
    assert_eq!(
        payloads(&store),
        vec![r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":3}"#]
    );
}

#[tokio::test]
async fn test_eager_flush_failure_keeps_entries() {
    let (store, writer) = writer(100, 1000);
    store.set_available(false);

    writer.write(json!({"level": "info"})).await;
    writer.write(json!({"level": "fatal"})).await;
    assert_eq!(writer.buffered_len(), 2);
    assert_eq!(store.raw_event_count(), 0);
}

#[tokio::test]
async fn test_malformed_payload_is_wrapped() {
    let (store, writer) = writer(100, 1000);

    writer.write("not json at all").await;
    writer.flush().await;

    assert_eq!(payloads(&store), vec![r#"{"message":"not json at all"}"#]);
    assert_eq!(writer.metrics().malformed_wrapped, 1);
}

#[tokio::test]
async fn test_source_token_is_kept() {
    let (store, writer) = writer(100, 1000);

    writer
        .write(IngestEvent::from(json!({"m": 1})).with_source_token("api-key-3"))
        .await;
    writer.flush().await;

    assert_eq!(store.raw_event(1).unwrap().source_token.as_deref(), Some("api-key-3"));
}

#[tokio::test]
async fn test_enqueue_does_not_flush_inline() {
    let (store, writer) = writer(100, 1000);

    assert!(writer.enqueue(json!({"level": "error"})));
    // inline flush is reserved for `write`
    assert_eq!(writer.buffered_len() + store.raw_event_count(), 1);

    writer.close().await;
    assert_eq!(store.raw_event_count(), 1);
}

#[tokio::test]
async fn test_close_flushes_and_is_idempotent() {
    let (store, writer) = writer(100, 1000);

    writer.write(json!({"n": 1})).await;
    writer.close().await;
    assert!(writer.is_closed());
    assert_eq!(store.raw_event_count(), 1);

    writer.close().await;
    assert_eq!(store.raw_event_count(), 1);
}

#[tokio::test]
async fn test_writes_after_close_are_dropped() {
    let (store, writer) = writer(100, 1000);
    writer.close().await;

    assert!(!writer.enqueue(json!({"n": 1})));
    writer.write(json!({"level": "fatal"})).await;

    assert_eq!(writer.buffered_len(), 0);
    assert_eq!(store.raw_event_count(), 0);
    assert_eq!(writer.metrics().dropped_closed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers() {
    let store = Arc::new(MemoryStore::new());
    let writer = Arc::new(BufferedWriter::new(store.clone(), &config(50, 100_000)));

    let mut handles = Vec::new();
    for p in 0..8 {
        let writer = Arc::clone(&writer);
        handles.push(tokio::spawn(async move {
            for i in 0..100 {
                writer.write(json!({"producer": p, "n": i})).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    writer.close().await;
    assert_eq!(store.raw_event_count(), 800);
    assert_eq!(writer.metrics().accepted, 800);
    assert_eq!(writer.metrics().flushed, 800);
}
