//! Observability metrics for dispatching.
//!
//! Provides counters describing queue intake and dispatch results for
//! monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking dispatch statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Producers and the dispatcher update the same counters; they can be
/// queried at any time.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Records accepted by the queue
    submitted: AtomicU64,
    /// Sender invocations (each consumed a slot)
    attempted: AtomicU64,
    /// Attempts the sender reported as successful
    delivered: AtomicU64,
    /// Attempts the sender reported as failed
    failed: AtomicU64,
    /// Records dropped because no route matched their variant
    unsupported: AtomicU64,
    /// Records dequeued but abandoned by shutdown before a slot was granted
    cancelled: AtomicU64,
    /// Slot acquisitions that had to wait
    throttled: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_submitted(&self) {
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        self.inner.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unsupported(&self) {
        self.inner.unsupported.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.inner.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttled(&self) {
        self.inner.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.inner.submitted.load(Ordering::Relaxed)
    }

    pub fn attempted(&self) -> u64 {
        self.inner.attempted.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    pub fn unsupported(&self) -> u64 {
        self.inner.unsupported.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    pub fn throttled(&self) -> u64 {
        self.inner.throttled.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted(),
            attempted: self.attempted(),
            delivered: self.delivered(),
            failed: self.failed(),
            unsupported: self.unsupported(),
            cancelled: self.cancelled(),
            throttled: self.throttled(),
        }
    }

    /// Reset all metrics to zero.
    ///
    /// Useful for testing or when starting a new monitoring period.
    pub fn reset(&self) {
        self.inner.submitted.store(0, Ordering::Relaxed);
        self.inner.attempted.store(0, Ordering::Relaxed);
        self.inner.delivered.store(0, Ordering::Relaxed);
        self.inner.failed.store(0, Ordering::Relaxed);
        self.inner.unsupported.store(0, Ordering::Relaxed);
        self.inner.cancelled.store(0, Ordering::Relaxed);
        self.inner.throttled.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub unsupported: u64,
    pub cancelled: u64,
    pub throttled: u64,
}

impl MetricsSnapshot {
    /// Records accepted but not yet finished (queued or in flight).
    ///
    /// Counters are read one by one, so under concurrent updates this is an
    /// approximation.
    pub fn pending(&self) -> u64 {
        let finished = self
            .delivered
            .saturating_add(self.failed)
            .saturating_add(self.unsupported)
            .saturating_add(self.cancelled);
        self.submitted.saturating_sub(finished)
    }

    /// Fraction of attempts that failed (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been attempted.
    pub fn failure_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.failed as f64 / self.attempted as f64
        }
    }
}
