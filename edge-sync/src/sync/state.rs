//! Run lifecycle state and per-order locks

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use shared::sync::SyncOperation;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// `Idle -> Running(op) -> Completed(op) | Failed(op)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running(SyncOperation),
    Completed(SyncOperation),
    Failed(SyncOperation),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running(_))
    }

    pub fn operation(&self) -> Option<SyncOperation> {
        match self {
            RunState::Idle => None,
            RunState::Running(op) | RunState::Completed(op) | RunState::Failed(op) => Some(*op),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Running(op) => write!(f, "running ({})", op),
            RunState::Completed(op) => write!(f, "completed ({})", op),
            RunState::Failed(op) => write!(f, "failed ({})", op),
        }
    }
}

/// Per-order async locks
///
/// Detection, resolution and write-back for one order id are serialized
/// across runs and manual resolutions. Guards are owned so they can be held
/// across backend calls.
#[derive(Debug, Default)]
pub struct OrderLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(order_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Lock several orders in id order so two callers cannot deadlock
    pub async fn lock_all(&self, order_ids: &[Uuid]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids = order_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock(id).await);
        }
        guards
    }

    /// Drop entries nobody holds or waits on
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
