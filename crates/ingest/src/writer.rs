//! Buffered ingest writer
//!
//! Producers push into an in-memory queue guarded by one mutex. The mutex is
//! only held for queue mutation, never across a store call. A background task
//! flushes once `flush_interval` has passed since the last flush of any kind,
//! and when the queue reaches `batch_size`; events whose severity is in the
//! eager set flush the whole queue before `write` returns.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use silt_config::IngestConfig;
use silt_protocol::{NewRawEvent, Severity};
use silt_store::Store;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::IngestEvent;
use crate::metrics::{IngestMetrics, IngestMetricsSnapshot};
use crate::rate_limited_logger::RateLimitedLogger;

/// What an enqueue asks of the flusher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Quiet,
    Size,
    Eager,
}

struct Inner {
    store: Arc<dyn Store>,
    batch_size: usize,
    capacity: usize,
    eager_levels: Vec<Severity>,
    buffer: Mutex<VecDeque<NewRawEvent>>,
    /// Serializes flushes so re-queued batches keep their order
    flush_lock: tokio::sync::Mutex<()>,
    flush_wanted: Notify,
    /// Start of the most recent flush, manual and eager ones included
    last_flush: Mutex<Instant>,
    cancel: CancellationToken,
    closed: AtomicBool,
    metrics: IngestMetrics,
    failures: RateLimitedLogger,
}

/// Batching writer in front of the raw store
pub struct BufferedWriter {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl BufferedWriter {
    /// Create a writer and start its flush task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn Store>, config: &IngestConfig) -> Self {
        let eager_levels = config
            .eager_flush_levels
            .iter()
            .filter_map(|level| Severity::parse(level))
            .collect();

        let inner = Arc::new(Inner {
            store,
            batch_size: config.batch_size.max(1),
            capacity: config.capacity.max(1),
            eager_levels,
            buffer: Mutex::new(VecDeque::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            flush_wanted: Notify::new(),
            last_flush: Mutex::new(Instant::now()),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            metrics: IngestMetrics::new(),
            failures: RateLimitedLogger::default(),
        });

        let timer = tokio::spawn(run_flusher(Arc::clone(&inner), config.flush_interval));

        Self {
            inner,
            timer: Mutex::new(Some(timer)),
        }
    }

    /// Queue an event, flushing inline if its severity is critical
    pub async fn write(&self, event: impl Into<IngestEvent>) {
        match self.inner.enqueue(event.into()) {
            Some(Trigger::Eager) => {
                self.inner.metrics.record_eager_flush();
                self.inner.flush().await;
            }
            Some(Trigger::Size) => self.inner.flush_wanted.notify_one(),
            Some(Trigger::Quiet) | None => {}
        }
    }

    /// Queue an event without awaiting anything
    ///
    /// Critical severities and full batches wake the background flusher
    /// instead of flushing inline. Returns `false` if the writer is closed.
    pub fn enqueue(&self, event: impl Into<IngestEvent>) -> bool {
        match self.inner.enqueue(event.into()) {
            Some(Trigger::Eager) => {
                self.inner.metrics.record_eager_flush();
                self.inner.flush_wanted.notify_one();
                true
            }
            Some(Trigger::Size) => {
                self.inner.flush_wanted.notify_one();
                true
            }
            Some(Trigger::Quiet) => true,
            None => false,
        }
    }

    /// Persist everything currently buffered, returning how many were stored
    ///
    /// On a store error the batch goes back to the front of the queue.
    pub async fn flush(&self) -> usize {
        self.inner.flush().await
    }

    /// Stop the flush task and persist what is left; safe to call repeatedly
    pub async fn close(&self) {
        {
            let _buffer = self.inner.buffer.lock();
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        self.inner.cancel.cancel();
        let timer = self.timer.lock().take();
        if let Some(timer) = timer
            && let Err(e) = timer.await
        {
            warn!(error = %e, "flush task ended abnormally");
        }

        self.inner.flush().await;

        let remaining = self.buffered_len();
        if remaining > 0 {
            warn!(remaining, "writer closed with unflushed events");
        }
        let metrics = self.metrics();
        info!(
            accepted = metrics.accepted,
            flushed = metrics.flushed,
            evicted = metrics.evicted,
            "writer closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Events waiting in memory
    pub fn buffered_len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn metrics(&self) -> IngestMetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl Drop for BufferedWriter {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    /// Push under the buffer lock; `None` when closed
    fn enqueue(&self, event: IngestEvent) -> Option<Trigger> {
        let prepared = event.prepare();
        if prepared.wrapped {
            self.metrics.record_malformed();
        }

        let mut raw = NewRawEvent::new(prepared.bytes);
        raw.source_token = prepared.source_token;

        let mut buffer = self.buffer.lock();
        if self.closed.load(Ordering::SeqCst) {
            drop(buffer);
            self.metrics.record_dropped_closed();
            return None;
        }

        buffer.push_back(raw);
        self.metrics.record_accepted();
        let evicted = evict_oldest(&mut buffer, self.capacity);
        let len = buffer.len();
        drop(buffer);

        if evicted > 0 {
            self.metrics.record_evicted(evicted);
        }

        if self.eager_levels.contains(&prepared.severity) {
            Some(Trigger::Eager)
        } else if len >= self.batch_size {
            Some(Trigger::Size)
        } else {
            Some(Trigger::Quiet)
        }
    }

    async fn flush(&self) -> usize {
        let _flushing = self.flush_lock.lock().await;
        *self.last_flush.lock() = Instant::now();

        let batch: Vec<NewRawEvent> = self.buffer.lock().drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        match self.store.append(&batch).await {
            Ok(ids) => {
                self.metrics.record_flush(ids.len() as u64);
                debug!(count = ids.len(), "flushed batch");
                ids.len()
            }
            Err(e) => {
                self.metrics.record_flush_failure();
                self.failures.warn("flush failed, batch re-queued", &e);
                self.requeue(batch);
                0
            }
        }
    }

    /// Put a failed batch back ahead of anything queued since
    fn requeue(&self, batch: Vec<NewRawEvent>) {
        let mut buffer = self.buffer.lock();
        for event in batch.into_iter().rev() {
            buffer.push_front(event);
        }
        let evicted = evict_oldest(&mut buffer, self.capacity);
        drop(buffer);

        if evicted > 0 {
            self.metrics.record_evicted(evicted);
        }
    }
}

fn evict_oldest(buffer: &mut VecDeque<NewRawEvent>, capacity: usize) -> u64 {
    let mut evicted = 0;
    while buffer.len() > capacity {
        buffer.pop_front();
        evicted += 1;
    }
    evicted
}

async fn run_flusher(inner: Arc<Inner>, interval: Duration) {
    let interval = interval.max(Duration::from_millis(1));

    loop {
        let due = *inner.last_flush.lock() + interval;
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep_until(due) => {
                // another flush may have moved the deadline while we slept
                if Instant::now() >= *inner.last_flush.lock() + interval {
                    inner.flush().await;
                }
            }
            _ = inner.flush_wanted.notified() => {
                inner.flush().await;
            }
        }
    }

    debug!("flush task stopped");
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod tests;
