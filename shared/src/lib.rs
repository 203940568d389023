//! Shared types for the edge order sync workspace
//!
//! Serializable value types used by the sync engine and its collaborators:
//! error codes, the order aggregate, and the sync / conflict records.

pub mod error;
pub mod order;
pub mod sync;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use order::{OrderItem, OrderSnapshot, OrderStatus, SyncState};
pub use serde::{Deserialize, Serialize};
