//! Write-back metrics.
//!
//! Tracks flush throughput, failures and payload sizes for logging and
//! diagnostics. Atomics keep reads cheap from any thread holding the `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FlushMetrics {
    /// Items written back successfully
    flushed: AtomicU64,

    /// Flushes abandoned because the accessor or store failed
    failed: AtomicU64,

    /// Payloads dropped for exceeding the byte ceiling
    dropped_payloads: AtomicU64,

    /// Sum of embedded payload bytes written
    payload_bytes: AtomicU64,

    total_flush_nanos: AtomicU64,
    max_flush_nanos: AtomicU64,
}

impl FlushMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed: Duration, payload_bytes: usize) {
        let nanos = elapsed.as_nanos() as u64;
        self.flushed.fetch_add(1, Ordering::Relaxed);
        self.payload_bytes
            .fetch_add(payload_bytes as u64, Ordering::Relaxed);
        self.total_flush_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_flush_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_payload(&self) {
        self.dropped_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flushed(&self) -> u64 {
        self.flushed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped_payloads(&self) -> u64 {
        self.dropped_payloads.load(Ordering::Relaxed)
    }

    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes.load(Ordering::Relaxed)
    }

    pub fn avg_flush_time(&self) -> Duration {
        let flushed = self.flushed();
        if flushed == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_flush_nanos.load(Ordering::Relaxed) / flushed)
        }
    }

    pub fn max_flush_time(&self) -> Duration {
        Duration::from_nanos(self.max_flush_nanos.load(Ordering::Relaxed))
    }

    /// Point-in-time copy. Fields are read individually, not as one atomic unit.
    pub fn snapshot(&self) -> FlushMetricsSnapshot {
        FlushMetricsSnapshot {
            flushed: self.flushed(),
            failed: self.failed(),
            dropped_payloads: self.dropped_payloads(),
            payload_bytes: self.payload_bytes(),
            avg_flush_time: self.avg_flush_time(),
            max_flush_time: self.max_flush_time(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushMetricsSnapshot {
    pub flushed: u64,
    pub failed: u64,
    pub dropped_payloads: u64,
    pub payload_bytes: u64,
    pub avg_flush_time: Duration,
    pub max_flush_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accumulate() {
        let metrics = FlushMetrics::new();
        metrics.record_success(Duration::from_millis(2), 100);
        metrics.record_success(Duration::from_millis(4), 50);
        metrics.record_failure();
        metrics.record_dropped_payload();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flushed, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.dropped_payloads, 1);
        assert_eq!(snapshot.payload_bytes, 150);
        assert_eq!(snapshot.avg_flush_time, Duration::from_millis(3));
        assert_eq!(snapshot.max_flush_time, Duration::from_millis(4));
    }
}
