//! 同步生命周期事件
//!
//! 每个 [`SyncListener`](super::SyncListener) 回调对应一个变体，
//! 事件自持数据，可以跨线程发送或序列化。

use serde::{Deserialize, Serialize};
use shared::sync::{
    ConflictInfo, ConflictResolution, HealthStatus, SyncError, SyncOperation, SyncResult,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    SyncStarted {
        operation: SyncOperation,
        order_count: usize,
    },
    SyncProgress {
        operation: SyncOperation,
        completed: usize,
        total: usize,
    },
    OrderSynced {
        order_id: Uuid,
        external_id: Option<String>,
    },
    OrderSyncFailed {
        order_id: Uuid,
        error: SyncError,
    },
    ConflictDetected {
        conflict: Box<ConflictInfo>,
    },
    ConflictResolved {
        conflict: Box<ConflictInfo>,
        resolution: Box<ConflictResolution>,
    },
    SyncCompleted {
        result: Box<SyncResult>,
    },
    SyncFailed {
        operation: SyncOperation,
        error: SyncError,
    },
    NetworkStatusChanged {
        online: bool,
    },
    BackendStatusChanged {
        health: HealthStatus,
    },
    RetryAttempt {
        order_id: Uuid,
        attempt: u32,
        error: SyncError,
    },
}

impl SyncEvent {
    /// 事件名，用于日志字段
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SyncStarted { .. } => "sync_started",
            SyncEvent::SyncProgress { .. } => "sync_progress",
            SyncEvent::OrderSynced { .. } => "order_synced",
            SyncEvent::OrderSyncFailed { .. } => "order_sync_failed",
            SyncEvent::ConflictDetected { .. } => "conflict_detected",
            SyncEvent::ConflictResolved { .. } => "conflict_resolved",
            SyncEvent::SyncCompleted { .. } => "sync_completed",
            SyncEvent::SyncFailed { .. } => "sync_failed",
            SyncEvent::NetworkStatusChanged { .. } => "network_status_changed",
            SyncEvent::BackendStatusChanged { .. } => "backend_status_changed",
            SyncEvent::RetryAttempt { .. } => "retry_attempt",
        }
    }

    /// 该事件关联的订单 (若有)
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            SyncEvent::OrderSynced { order_id, .. }
            | SyncEvent::OrderSyncFailed { order_id, .. }
            | SyncEvent::RetryAttempt { order_id, .. } => Some(*order_id),
            SyncEvent::ConflictDetected { conflict }
            | SyncEvent::ConflictResolved { conflict, .. } => Some(conflict.order_id),
            _ => None,
        }
    }

    /// 是否为一次运行的终结事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncEvent::SyncCompleted { .. } | SyncEvent::SyncFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = SyncEvent::SyncProgress {
            operation: SyncOperation::Push,
            completed: 2,
            total: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sync_progress");
        assert_eq!(json["operation"], "PUSH");
        assert_eq!(json["completed"], 2);
        assert!(!event.is_terminal());
        assert_eq!(event.order_id(), None);
    }

    #[test]
    fn test_order_id_accessor() {
        let id = Uuid::new_v4();
        let event = SyncEvent::OrderSynced {
            order_id: id,
            external_id: Some("EXT-000001".into()),
        };
        assert_eq!(event.order_id(), Some(id));
        assert_eq!(event.name(), "order_synced");
    }
}
