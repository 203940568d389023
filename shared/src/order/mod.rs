//! Order Module
//!
//! The order aggregate as both sides of a sync see it:
//! - Types: status set and line items
//! - Snapshot: the order with its totals and sync bookkeeping

pub mod snapshot;
pub mod types;

// Re-exports
pub use snapshot::{OrderSnapshot, SyncState};
pub use types::{OrderItem, OrderStatus};
