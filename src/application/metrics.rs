//! Observability metrics for rate-limited subscriptions.
//!
//! Provides counters for every signal the gateway handles, shared by all
//! subscriptions created through the same operator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking gateway statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Cloning shares the underlying counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Elements settled as successes and forwarded
    elements_settled: AtomicU64,
    /// Failures settled and forwarded
    failures_settled: AtomicU64,
    /// Elements dropped because they arrived after termination
    elements_dropped: AtomicU64,
    /// Completions forwarded
    completions: AtomicU64,
    /// Subscriptions refused a permit
    subscriptions_rejected: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_settled(&self) {
        self.inner.elements_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.inner.failures_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.inner.elements_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completion(&self) {
        self.inner.completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner
            .subscriptions_rejected
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of elements settled and forwarded.
    pub fn elements_settled(&self) -> u64 {
        self.inner.elements_settled.load(Ordering::Relaxed)
    }

    /// Get the number of failures settled and forwarded.
    pub fn failures_settled(&self) -> u64 {
        self.inner.failures_settled.load(Ordering::Relaxed)
    }

    /// Get the number of elements dropped after termination.
    pub fn elements_dropped(&self) -> u64 {
        self.inner.elements_dropped.load(Ordering::Relaxed)
    }

    /// Get the number of completions forwarded.
    pub fn completions(&self) -> u64 {
        self.inner.completions.load(Ordering::Relaxed)
    }

    /// Get the number of subscriptions refused a permit.
    pub fn subscriptions_rejected(&self) -> u64 {
        self.inner.subscriptions_rejected.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            elements_settled: self.elements_settled(),
            failures_settled: self.failures_settled(),
            elements_dropped: self.elements_dropped(),
            completions: self.completions(),
            subscriptions_rejected: self.subscriptions_rejected(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.elements_settled.store(0, Ordering::Relaxed);
        self.inner.failures_settled.store(0, Ordering::Relaxed);
        self.inner.elements_dropped.store(0, Ordering::Relaxed);
        self.inner.completions.store(0, Ordering::Relaxed);
        self.inner.subscriptions_rejected.store(0, Ordering::Relaxed);
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
    /// Elements settled as successes and forwarded
    pub elements_settled: u64,
    /// Failures settled and forwarded
    pub failures_settled: u64,
    /// Elements dropped after termination
    pub elements_dropped: u64,
    /// Completions forwarded
    pub completions: u64,
    /// Subscriptions refused a permit
    pub subscriptions_rejected: u64,
}

impl MetricsSnapshot {
    /// Fraction of arriving elements that were dropped (0.0 to 1.0).
    ///
    /// Returns 0.0 if no elements have arrived.
    pub fn drop_rate(&self) -> f64 {
        let total = self.elements_settled.saturating_add(self.elements_dropped);
        if total == 0 {
            0.0
        } else {
            self.elements_dropped as f64 / total as f64
        }
    }

    /// Total signals handled: elements (settled or dropped), failures and completions.
    pub fn total_signals(&self) -> u64 {
        self.elements_settled
            .saturating_add(self.elements_dropped)
            .saturating_add(self.failures_settled)
            .saturating_add(self.completions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_settled();
        metrics.record_settled();
        metrics.record_dropped();
        metrics.record_failure();
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.elements_settled, 2);
        assert_eq!(snapshot.elements_dropped, 1);
        assert_eq!(snapshot.failures_settled, 1);
        assert_eq!(snapshot.completions, 0);
        assert_eq!(snapshot.subscriptions_rejected, 1);
        assert_eq!(snapshot.total_signals(), 4);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_completion();
        assert_eq!(metrics.completions(), 1);
    }

    #[test]
    fn test_drop_rate() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().drop_rate(), 0.0);

        for _ in 0..3 {
            metrics.record_settled();
        }
        metrics.record_dropped();
        assert_eq!(metrics.snapshot().drop_rate(), 0.25);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_settled();
        metrics.record_completion();
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Metrics::new();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_settled();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.elements_settled(), 1000);
    }
}
