//! Conflict detection and resolution

pub mod detector;
pub mod merge;
pub mod resolver;

pub use detector::{ConflictDetector, DEFAULT_CONFLICT_WINDOW, DetectionError};
pub use merge::{merge_orders, priority_score, select_by_priority, select_by_timestamp};
pub use resolver::{ConflictResolver, ResolutionError};
