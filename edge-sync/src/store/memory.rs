//! In-memory order store
//!
//! Used by tests and by hosts that persist snapshots elsewhere. Listings are
//! ordered by `created_at`, then `order_id`, so sync runs are deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::error::{AppError, AppResult};
use shared::order::OrderSnapshot;
use uuid::Uuid;

use super::OrderStore;

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, OrderSnapshot>>,
    fail_saves: AtomicBool,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with orders
    pub fn with_orders(orders: impl IntoIterator<Item = OrderSnapshot>) -> Self {
        let store = Self::new();
        {
            let mut map = store.orders.write();
            for order in orders {
                map.insert(order.order_id, order);
            }
        }
        store
    }

    /// Make every subsequent `save` fail with a storage error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Synchronous read, handy in assertions
    pub fn get(&self, order_id: Uuid) -> Option<OrderSnapshot> {
        self.orders.read().get(&order_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    fn sorted(mut orders: Vec<OrderSnapshot>) -> Vec<OrderSnapshot> {
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        orders
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn save(&self, order: &OrderSnapshot) -> AppResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::storage("order store is read-only")
                .with_detail("order_id", order.order_id.to_string()));
        }
        self.orders.write().insert(order.order_id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, order_id: Uuid) -> AppResult<Option<OrderSnapshot>> {
        Ok(self.get(order_id))
    }

    async fn find_all(&self) -> AppResult<Vec<OrderSnapshot>> {
        let orders = self.orders.read().values().cloned().collect();
        Ok(Self::sorted(orders))
    }

    async fn find_orders_requiring_sync(&self) -> AppResult<Vec<OrderSnapshot>> {
        let orders = self
            .orders
            .read()
            .values()
            .filter(|o| o.needs_sync())
            .cloned()
            .collect();
        Ok(Self::sorted(orders))
    }

    async fn delete(&self, order_id: Uuid) -> AppResult<bool> {
        Ok(self.orders.write().remove(&order_id).is_some())
    }
}
