//! Synchronization value types
//!
//! - Conflict: conflict taxonomy, conflict records and resolutions
//! - Error: per-order sync failures
//! - Result: run results, statistics, operation kinds
//! - Backend: responses, rate limits, health and credentials of the backend

pub mod backend;
pub mod conflict;
pub mod error;
pub mod result;

// Re-exports
pub use backend::{
    BackendCredentials, BackendError, BackendResponse, HealthLevel, HealthStatus, RateLimit,
};
pub use conflict::{
    ConflictInfo, ConflictResolution, ConflictResolutionResult, ConflictResolutionStrategy,
    ConflictSeverity, ConflictType, SYSTEM_RESOLVER,
};
pub use error::{DEFAULT_RATE_LIMIT_BACKOFF_SECS, SyncError, SyncErrorType};
pub use result::{SyncOperation, SyncResult, SyncStatistics};
