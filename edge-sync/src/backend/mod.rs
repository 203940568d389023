//! Backend system-of-record contract
//!
//! Transport failures (unreachable, timed out, rate limited, unauthenticated)
//! come back as `Err(AppError)`. Per-order rejections come back as
//! `Ok(BackendResponse)` with `success == false` and entries in `errors`.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::error::AppResult;
use shared::order::OrderSnapshot;
use shared::sync::{BackendCredentials, BackendResponse, HealthStatus, RateLimit};
use uuid::Uuid;

pub use memory::{Fault, InMemoryBackend};

#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn push_order(&self, order: &OrderSnapshot) -> AppResult<BackendResponse>;

    /// Batch upload for callers that push whole chunks
    ///
    /// The sync engine pushes one order per call so each order retries and
    /// fails on its own; [`max_batch_size`](Self::max_batch_size) sizes its
    /// chunks and the batched [`pull_orders`](Self::pull_orders) lookups.
    async fn push_orders(&self, orders: &[OrderSnapshot]) -> AppResult<BackendResponse>;

    /// Missing orders are not an error; the response simply carries no order
    async fn pull_order(&self, order_id: Uuid) -> AppResult<BackendResponse>;

    async fn pull_orders(&self, order_ids: &[Uuid]) -> AppResult<BackendResponse>;

    async fn pull_updated_since(&self, since: DateTime<Utc>) -> AppResult<BackendResponse>;

    async fn pull_for_passenger(&self, passenger_id: Uuid) -> AppResult<BackendResponse>;

    async fn pull_for_seat(&self, seat_number: &str) -> AppResult<BackendResponse>;

    async fn delete_order(&self, order_id: Uuid) -> AppResult<BackendResponse>;

    async fn is_available(&self) -> bool;

    async fn check_health(&self) -> HealthStatus;

    async fn authenticate(&self, credentials: &BackendCredentials) -> AppResult<()>;

    async fn refresh_authentication(&self) -> AppResult<()>;

    /// Largest number of orders the backend accepts per batch; also the
    /// engine's chunk size
    fn max_batch_size(&self) -> usize;

    fn rate_limit(&self) -> RateLimit;
}
