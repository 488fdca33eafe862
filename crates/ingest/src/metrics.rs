//! Writer metrics
//!
//! Atomic counters for the buffered writer; read them through [`IngestMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one writer
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Events accepted into the buffer
    pub accepted: AtomicU64,

    /// Events persisted by a flush
    pub flushed: AtomicU64,

    /// Successful non-empty flushes
    pub flushes: AtomicU64,

    /// Oldest entries dropped because the buffer was full
    pub evicted: AtomicU64,

    /// Flushes triggered by a critical severity
    pub eager_flushes: AtomicU64,

    /// Flushes whose batch was re-queued after a store error
    pub flush_failures: AtomicU64,

    /// Non-object payloads wrapped as plain text
    pub malformed_wrapped: AtomicU64,

    /// Writes refused because the writer was closed
    pub dropped_closed: AtomicU64,
}

impl IngestMetrics {
    pub const fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            eager_flushes: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            malformed_wrapped: AtomicU64::new(0),
            dropped_closed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush(&self, count: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evicted(&self, count: u64) {
        self.evicted.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eager_flush(&self) {
        self.eager_flushes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.malformed_wrapped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped_closed(&self) {
        self.dropped_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        IngestMetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            eager_flushes: self.eager_flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            malformed_wrapped: self.malformed_wrapped.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`IngestMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestMetricsSnapshot {
    pub accepted: u64,
    pub flushed: u64,
    pub flushes: u64,
    pub evicted: u64,
    pub eager_flushes: u64,
    pub flush_failures: u64,
    pub malformed_wrapped: u64,
    pub dropped_closed: u64,
}
