//! Pool counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative pool counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Physical connections opened
    pub connections_created: u64,
    /// Physical connections closed, successfully or not
    pub connections_destroyed: u64,
    /// Successful `acquire` calls
    pub acquisitions: u64,
    /// `acquire` calls that timed out waiting for a slot
    pub exhausted_count: u64,
    /// Total time spent inside successful `acquire` calls, in milliseconds
    pub total_wait_time_ms: u64,
    /// Health probes that failed or timed out
    pub validation_failures: u64,
}

impl PoolStats {
    /// Average time a successful `acquire` took, in milliseconds.
    pub fn avg_wait_time_ms(&self) -> f64 {
        if self.acquisitions == 0 {
            0.0
        } else {
            self.total_wait_time_ms as f64 / self.acquisitions as f64
        }
    }
}

/// Lock-free counters updated from concurrent pool operations.
#[derive(Debug, Default)]
pub(crate) struct AtomicPoolStats {
    connections_created: AtomicU64,
    connections_destroyed: AtomicU64,
    acquisitions: AtomicU64,
    exhausted_count: AtomicU64,
    total_wait_time_ms: AtomicU64,
    validation_failures: AtomicU64,
}

impl AtomicPoolStats {
    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_destroyed(&self) {
        self.connections_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquisition(&self, wait_time_ms: u64) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.total_wait_time_ms
            .fetch_add(wait_time_ms, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_destroyed: self.connections_destroyed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
            total_wait_time_ms: self.total_wait_time_ms.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let stats = AtomicPoolStats::default();
        stats.record_created();
        stats.record_created();
        stats.record_destroyed();
        stats.record_acquisition(10);
        stats.record_acquisition(30);
        stats.record_exhausted();
        stats.record_validation_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_created, 2);
        assert_eq!(snapshot.connections_destroyed, 1);
        assert_eq!(snapshot.acquisitions, 2);
        assert_eq!(snapshot.exhausted_count, 1);
        assert_eq!(snapshot.validation_failures, 1);
        assert!((snapshot.avg_wait_time_ms() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_avg_wait_without_acquisitions() {
        assert!(PoolStats::default().avg_wait_time_ms().abs() < f64::EPSILON);
    }
}
