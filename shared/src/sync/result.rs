//! Sync run results and statistics

use super::conflict::ConflictInfo;
use super::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Sync Operation
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    FullSync,
    Push,
    Pull,
    SingleOrder,
    BatchSync,
    ConflictResolution,
    Validation,
    Retry,
    EmergencySync,
    BackgroundSync,
}

impl SyncOperation {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::FullSync => "Full Synchronization",
            Self::Push => "Push to Backend",
            Self::Pull => "Pull from Backend",
            Self::SingleOrder => "Single Order Sync",
            Self::BatchSync => "Batch Synchronization",
            Self::ConflictResolution => "Conflict Resolution",
            Self::Validation => "Data Validation",
            Self::Retry => "Retry Synchronization",
            Self::EmergencySync => "Emergency Synchronization",
            Self::BackgroundSync => "Background Synchronization",
        }
    }

    pub fn is_push_operation(&self) -> bool {
        matches!(
            self,
            Self::Push
                | Self::FullSync
                | Self::SingleOrder
                | Self::BatchSync
                | Self::EmergencySync
                | Self::BackgroundSync
        )
    }

    pub fn is_pull_operation(&self) -> bool {
        matches!(self, Self::Pull | Self::FullSync | Self::BackgroundSync)
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ConflictResolution | Self::Validation)
    }

    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::EmergencySync | Self::SingleOrder)
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Sync Statistics
// ============================================================================

/// Counters for one run; rates are derived on read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStatistics {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_records: u32,
    pub successful_records: u32,
    pub failed_records: u32,
    pub conflicted_records: u32,
    pub skipped_records: u32,
    pub bytes_transferred: u64,
    pub network_requests: u32,
    pub retry_attempts: u32,
}

impl SyncStatistics {
    /// Zeroed statistics for a run that started and ended at `at`
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            start_time: at,
            end_time: at,
            total_records: 0,
            successful_records: 0,
            failed_records: 0,
            conflicted_records: 0,
            skipped_records: 0,
            bytes_transferred: 0,
            network_requests: 0,
            retry_attempts: 0,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds().max(0)
    }

    fn duration_secs(&self) -> i64 {
        self.duration_ms() / 1000
    }

    fn percent(part: u32, total: u32) -> f64 {
        if total == 0 {
            return 0.0;
        }
        part as f64 / total as f64 * 100.0
    }

    pub fn success_rate(&self) -> f64 {
        Self::percent(self.successful_records, self.total_records)
    }

    pub fn failure_rate(&self) -> f64 {
        Self::percent(self.failed_records, self.total_records)
    }

    pub fn conflict_rate(&self) -> f64 {
        Self::percent(self.conflicted_records, self.total_records)
    }

    /// Whole seconds only; sub-second runs report 0
    pub fn records_per_second(&self) -> f64 {
        let secs = self.duration_secs();
        if secs <= 0 {
            return 0.0;
        }
        self.total_records as f64 / secs as f64
    }

    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.duration_secs();
        if secs <= 0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / secs as f64
    }

    /// Run duration divided by request count, in milliseconds
    pub fn average_request_time_ms(&self) -> f64 {
        if self.network_requests == 0 {
            return 0.0;
        }
        self.duration_ms() as f64 / self.network_requests as f64
    }

    pub fn summary(&self) -> String {
        let mut s = format!(
            "Sync Statistics: {}/{} successful ({:.1}%) in {}s",
            self.successful_records,
            self.total_records,
            self.success_rate(),
            self.duration_secs()
        );
        if self.failed_records > 0 {
            s.push_str(&format!(", {} failed", self.failed_records));
        }
        if self.conflicted_records > 0 {
            s.push_str(&format!(", {} conflicts", self.conflicted_records));
        }
        if self.retry_attempts > 0 {
            s.push_str(&format!(", {} retries", self.retry_attempts));
        }
        s
    }
}

// ============================================================================
// Sync Result
// ============================================================================

/// Outcome of one sync run; immutable once the run completes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    pub success: bool,
    pub operation: SyncOperation,
    pub timestamp: DateTime<Utc>,
    /// Orders accepted by the backend (or applied locally for pulls)
    pub processed_order_ids: Vec<Uuid>,
    pub failed_order_ids: Vec<Uuid>,
    pub errors: Vec<SyncError>,
    pub conflicts: Vec<ConflictInfo>,
    pub statistics: SyncStatistics,
    pub message: String,
}

impl SyncResult {
    /// Run rejected before touching any order
    pub fn rejected(
        operation: SyncOperation,
        message: impl Into<String>,
        errors: Vec<SyncError>,
        statistics: SyncStatistics,
    ) -> Self {
        Self {
            success: false,
            operation,
            timestamp: Utc::now(),
            processed_order_ids: Vec::new(),
            failed_order_ids: Vec::new(),
            errors,
            conflicts: Vec::new(),
            statistics,
            message: message.into(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn processed_count(&self) -> usize {
        self.processed_order_ids.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_order_ids.len()
    }

    /// Conflicts still waiting for a human
    pub fn unresolved_conflicts(&self) -> impl Iterator<Item = &ConflictInfo> {
        self.conflicts.iter().filter(|c| !c.is_resolved())
    }

    /// Failures a later run may retry
    pub fn retryable_errors(&self) -> impl Iterator<Item = &SyncError> {
        self.errors.iter().filter(|e| e.retryable)
    }
}
