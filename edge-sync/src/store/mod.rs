//! Local order store contract
//!
//! The engine reads pending orders from the store and writes back sync
//! outcomes. Implementations own persistence; the engine never caches.

pub mod memory;

use async_trait::async_trait;
use shared::error::AppResult;
use shared::order::OrderSnapshot;
use uuid::Uuid;

pub use memory::MemoryOrderStore;

/// Local persistence for order snapshots
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or replace by `order_id`
    async fn save(&self, order: &OrderSnapshot) -> AppResult<()>;

    async fn find_by_id(&self, order_id: Uuid) -> AppResult<Option<OrderSnapshot>>;

    async fn find_all(&self) -> AppResult<Vec<OrderSnapshot>>;

    /// Orders whose current version the backend has not accepted yet
    async fn find_orders_requiring_sync(&self) -> AppResult<Vec<OrderSnapshot>>;

    /// Returns whether an order was removed
    async fn delete(&self, order_id: Uuid) -> AppResult<bool>;
}
