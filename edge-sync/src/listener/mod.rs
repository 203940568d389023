//! 同步监听器
//!
//! # 投递语义
//!
//! - 每个已注册监听器都会收到事件 (至少一次)
//! - 在触发事件的运行中同步调用，同一监听器内按运行顺序到达
//! - 不同监听器之间不保证顺序
//!
//! 监听器回调在引擎的运行任务中执行，不应阻塞；需要异步处理时使用
//! [`ChannelListener`] 把事件转发到通道。

pub mod event;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use shared::sync::{
    ConflictInfo, ConflictResolution, HealthStatus, SyncError, SyncOperation, SyncResult,
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub use event::SyncEvent;

/// 同步生命周期回调，全部默认为空实现
pub trait SyncListener: Send + Sync {
    fn on_sync_started(&self, _operation: SyncOperation, _order_count: usize) {}

    fn on_sync_progress(&self, _operation: SyncOperation, _completed: usize, _total: usize) {}

    fn on_order_synced(&self, _order_id: Uuid, _external_id: Option<&str>) {}

    fn on_order_sync_failed(&self, _order_id: Uuid, _error: &SyncError) {}

    fn on_conflict_detected(&self, _conflict: &ConflictInfo) {}

    fn on_conflict_resolved(&self, _conflict: &ConflictInfo, _resolution: &ConflictResolution) {}

    fn on_sync_completed(&self, _result: &SyncResult) {}

    fn on_sync_failed(&self, _operation: SyncOperation, _error: &SyncError) {}

    fn on_network_status_changed(&self, _online: bool) {}

    fn on_backend_status_changed(&self, _health: &HealthStatus) {}

    fn on_retry_attempt(&self, _order_id: Uuid, _attempt: u32, _error: &SyncError) {}

    /// 分发到具体回调；需要整条事件流的实现可以覆盖它
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::SyncStarted {
                operation,
                order_count,
            } => self.on_sync_started(*operation, *order_count),
            SyncEvent::SyncProgress {
                operation,
                completed,
                total,
            } => self.on_sync_progress(*operation, *completed, *total),
            SyncEvent::OrderSynced {
                order_id,
                external_id,
            } => self.on_order_synced(*order_id, external_id.as_deref()),
            SyncEvent::OrderSyncFailed { order_id, error } => {
                self.on_order_sync_failed(*order_id, error)
            }
            SyncEvent::ConflictDetected { conflict } => self.on_conflict_detected(conflict),
            SyncEvent::ConflictResolved {
                conflict,
                resolution,
            } => self.on_conflict_resolved(conflict, resolution),
            SyncEvent::SyncCompleted { result } => self.on_sync_completed(result),
            SyncEvent::SyncFailed { operation, error } => self.on_sync_failed(*operation, error),
            SyncEvent::NetworkStatusChanged { online } => self.on_network_status_changed(*online),
            SyncEvent::BackendStatusChanged { health } => self.on_backend_status_changed(health),
            SyncEvent::RetryAttempt {
                order_id,
                attempt,
                error,
            } => self.on_retry_attempt(*order_id, *attempt, error),
        }
    }
}

/// 把事件转发到无界通道的监听器
///
/// 无界通道保证不丢事件，接收端按发送顺序读取。
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SyncListener for ChannelListener {
    fn on_event(&self, event: &SyncEvent) {
        // 接收端已关闭时静默丢弃
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(event = event.name(), "Listener channel closed");
        }
    }
}

/// 监听器注册句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// 监听器注册表
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn SyncListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn SyncListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// 返回是否确实移除了监听器
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// 依次同步调用每个监听器
    ///
    /// 先复制列表再调用，回调里增删监听器不会死锁。
    pub fn notify(&self, event: &SyncEvent) {
        let snapshot: Vec<Arc<dyn SyncListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
