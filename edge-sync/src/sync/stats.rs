//! Per-run statistics collector
//!
//! Concurrent pushes update the counters through shared references; the run
//! turns them into an immutable [`SyncStatistics`] when it finishes.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use shared::order::OrderSnapshot;
use shared::sync::SyncStatistics;

#[derive(Debug)]
pub struct StatsCollector {
    start_time: DateTime<Utc>,
    total: AtomicU32,
    successful: AtomicU32,
    failed: AtomicU32,
    conflicted: AtomicU32,
    skipped: AtomicU32,
    bytes: AtomicU64,
    requests: AtomicU32,
    retries: AtomicU32,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::start()
    }
}

impl StatsCollector {
    pub fn start() -> Self {
        Self {
            start_time: Utc::now(),
            total: AtomicU32::new(0),
            successful: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            conflicted: AtomicU32::new(0),
            skipped: AtomicU32::new(0),
            bytes: AtomicU64::new(0),
            requests: AtomicU32::new(0),
            retries: AtomicU32::new(0),
        }
    }

    pub fn add_total(&self, n: usize) {
        self.total.fetch_add(n as u32, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count the serialized size of orders sent or received
    pub fn record_transfer<'a>(&self, orders: impl IntoIterator<Item = &'a OrderSnapshot>) {
        let bytes: u64 = orders
            .into_iter()
            .filter_map(|o| serde_json::to_vec(o).ok())
            .map(|v| v.len() as u64)
            .sum();
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn successful(&self) -> u32 {
        self.successful.load(Ordering::Relaxed)
    }

    pub fn finish(&self) -> SyncStatistics {
        SyncStatistics {
            start_time: self.start_time,
            end_time: Utc::now(),
            total_records: self.total.load(Ordering::Relaxed),
            successful_records: self.successful.load(Ordering::Relaxed),
            failed_records: self.failed.load(Ordering::Relaxed),
            conflicted_records: self.conflicted.load(Ordering::Relaxed),
            skipped_records: self.skipped.load(Ordering::Relaxed),
            bytes_transferred: self.bytes.load(Ordering::Relaxed),
            network_requests: self.requests.load(Ordering::Relaxed),
            retry_attempts: self.retries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_finish_snapshots_counters() {
        let stats = StatsCollector::start();
        stats.add_total(4);
        stats.record_success();
        stats.record_success();
        stats.record_failure();
        stats.record_conflict();
        stats.record_request();
        stats.record_retry();

        let order = OrderSnapshot::new(Uuid::new_v4(), "7B");
        stats.record_transfer([&order]);

        let s = stats.finish();
        assert_eq!(s.total_records, 4);
        assert_eq!(s.successful_records, 2);
        assert_eq!(s.failed_records, 1);
        assert_eq!(s.conflicted_records, 1);
        assert_eq!(s.network_requests, 1);
        assert_eq!(s.retry_attempts, 1);
        assert_eq!(
            s.bytes_transferred,
            serde_json::to_vec(&order).unwrap().len() as u64
        );
        assert!(s.end_time >= s.start_time);
        assert!((s.success_rate() - 50.0).abs() < f64::EPSILON);
    }
}
