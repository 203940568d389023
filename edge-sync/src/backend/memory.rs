//! In-process backend with fault injection
//!
//! Keeps the remote copies in memory and answers like the real system of
//! record would: pushes store a synced copy with an external reference,
//! pulls return stored copies. Faults are queued per order (pushes) or
//! globally (pulls) and consumed one per call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::order::OrderSnapshot;
use shared::sync::{
    BackendCredentials, BackendError, BackendResponse, HealthStatus, RateLimit,
};
use uuid::Uuid;

use super::BackendClient;

/// Default maximum batch size advertised by the simulator
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// A hung call sleeps this long, far past any sane request timeout
const HANG_DURATION: Duration = Duration::from_secs(3600);

/// Injected failure for one backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Never answers; the caller's own timeout has to fire
    Hang,
    /// Transport-level timeout reported by the client
    Timeout,
    /// Rate limited, with an optional retry-after hint in seconds
    RateLimited(Option<u64>),
    /// HTTP 500 for the order
    ServerError,
    /// Business rejection (HTTP 422) with a reason
    Reject(String),
    /// Connection dropped
    Network,
}

#[derive(Debug)]
struct State {
    orders: HashMap<Uuid, OrderSnapshot>,
    push_faults: HashMap<Uuid, VecDeque<Fault>>,
    pull_faults: VecDeque<Fault>,
    available: bool,
    requires_auth: bool,
    authenticated: bool,
    refresh_fails: bool,
    latency: Duration,
    max_batch_size: usize,
    rate_limit: RateLimit,
    health: Option<HealthStatus>,
    next_external_id: u64,
}

#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    push_calls: AtomicU32,
    pull_calls: AtomicU32,
    pushes_in_flight: AtomicU32,
    peak_pushes_in_flight: AtomicU32,
}

/// Holds one slot of the in-flight push gauge; released on drop so timed-out
/// calls are accounted for too
struct InFlightPush<'a> {
    current: &'a AtomicU32,
}

impl<'a> InFlightPush<'a> {
    fn enter(current: &'a AtomicU32, peak: &AtomicU32) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlightPush<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                orders: HashMap::new(),
                push_faults: HashMap::new(),
                pull_faults: VecDeque::new(),
                available: true,
                requires_auth: false,
                authenticated: false,
                refresh_fails: false,
                latency: Duration::ZERO,
                max_batch_size: DEFAULT_MAX_BATCH_SIZE,
                rate_limit: RateLimit::unlimited(),
                health: None,
                next_external_id: 1,
            }),
            push_calls: AtomicU32::new(0),
            pull_calls: AtomicU32::new(0),
            pushes_in_flight: AtomicU32::new(0),
            peak_pushes_in_flight: AtomicU32::new(0),
        }
    }

    // ========== Builders ==========

    pub fn with_max_batch_size(self, size: usize) -> Self {
        self.state.lock().max_batch_size = size.max(1);
        self
    }

    pub fn with_rate_limit(self, rate_limit: RateLimit) -> Self {
        self.state.lock().rate_limit = rate_limit;
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Every call fails with `NotAuthenticated` until `authenticate` succeeds
    pub fn requiring_auth(self) -> Self {
        self.state.lock().requires_auth = true;
        self
    }

    // ========== Fault injection ==========

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn set_rate_limit(&self, rate_limit: RateLimit) {
        self.state.lock().rate_limit = rate_limit;
    }

    /// Override what `check_health` reports; `None` derives it from availability
    pub fn set_health(&self, health: Option<HealthStatus>) {
        self.state.lock().health = health;
    }

    pub fn set_refresh_fails(&self, fails: bool) {
        self.state.lock().refresh_fails = fails;
    }

    /// Fail the next `times` pushes of one order
    pub fn inject_fault(&self, order_id: Uuid, fault: Fault, times: usize) {
        let mut state = self.state.lock();
        let queue = state.push_faults.entry(order_id).or_default();
        queue.extend(std::iter::repeat_n(fault, times));
    }

    /// Fail the next `times` pull calls, whatever they ask for
    pub fn inject_pull_fault(&self, fault: Fault, times: usize) {
        self.state
            .lock()
            .pull_faults
            .extend(std::iter::repeat_n(fault, times));
    }

    // ========== Remote data ==========

    /// Seed a remote copy as-is
    pub fn insert_remote(&self, order: OrderSnapshot) {
        self.state.lock().orders.insert(order.order_id, order);
    }

    /// Edit the remote copy the way another terminal would; stamps `updated_at`
    pub fn apply_remote_change(&self, order_id: Uuid, change: impl FnOnce(&mut OrderSnapshot)) -> bool {
        let mut state = self.state.lock();
        match state.orders.get_mut(&order_id) {
            Some(order) => {
                change(order);
                order.updated_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn remote_order(&self, order_id: Uuid) -> Option<OrderSnapshot> {
        self.state.lock().orders.get(&order_id).cloned()
    }

    pub fn remote_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    pub fn push_calls(&self) -> u32 {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> u32 {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// Most push calls ever outstanding at the same time
    pub fn peak_pushes_in_flight(&self) -> u32 {
        self.peak_pushes_in_flight.load(Ordering::SeqCst)
    }

    // ========== Internals ==========

    fn gate(&self) -> AppResult<()> {
        let state = self.state.lock();
        if !state.available {
            return Err(AppError::backend_unavailable("backend is unreachable"));
        }
        if state.requires_auth && !state.authenticated {
            return Err(AppError::not_authenticated());
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_push_fault(&self, order_id: Uuid) -> Option<Fault> {
        let mut state = self.state.lock();
        let queue = state.push_faults.get_mut(&order_id)?;
        let fault = queue.pop_front();
        if queue.is_empty() {
            state.push_faults.remove(&order_id);
        }
        fault
    }

    fn next_pull_fault(&self) -> Option<Fault> {
        self.state.lock().pull_faults.pop_front()
    }

    /// Transport faults become errors; `Hang` only returns once the caller gave up
    async fn transport_error(fault: &Fault) -> AppError {
        match fault {
            Fault::Hang => {
                tokio::time::sleep(HANG_DURATION).await;
                AppError::timeout("backend never answered")
            }
            Fault::Timeout => AppError::timeout("backend request timed out"),
            Fault::RateLimited(Some(secs)) => AppError::rate_limited(*secs),
            Fault::RateLimited(None) => AppError::new(ErrorCode::RateLimited),
            Fault::Network => AppError::network("connection reset by peer"),
            Fault::ServerError | Fault::Reject(_) => AppError::internal("not a transport fault"),
        }
    }

    /// Per-order rejection carried inside a response
    fn order_rejection(fault: &Fault, order_id: Uuid) -> Option<(u16, BackendError)> {
        match fault {
            Fault::ServerError => Some((
                500,
                BackendError::new(ErrorCode::BackendServerError, "internal server error")
                    .for_order(order_id),
            )),
            Fault::Reject(reason) => Some((
                422,
                BackendError::new(ErrorCode::SyncRejected, reason.clone()).for_order(order_id),
            )),
            _ => None,
        }
    }

    fn store_pushed(&self, order: &OrderSnapshot) -> OrderSnapshot {
        let mut state = self.state.lock();
        let existing_ref = state
            .orders
            .get(&order.order_id)
            .and_then(|o| o.sync.external_id.clone())
            .or_else(|| order.sync.external_id.clone());
        let external_id = match existing_ref {
            Some(id) => id,
            None => {
                let id = format!("EXT-{:06}", state.next_external_id);
                state.next_external_id += 1;
                id
            }
        };

        let mut stored = order.clone();
        stored.sync.synced_with_backend = true;
        stored.sync.external_id = Some(external_id);
        stored.sync.remote_updated_at = None;
        state.orders.insert(stored.order_id, stored.clone());
        stored
    }

    fn elapsed_ms(started: Instant) -> u64 {
        started.elapsed().as_millis() as u64
    }

    /// Shared prologue of every pull: auth, latency, then an injected fault
    async fn begin_pull(&self) -> AppResult<Option<BackendResponse>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        self.simulate_latency().await;
        match self.next_pull_fault() {
            None => Ok(None),
            Some(Fault::ServerError) => Ok(Some(BackendResponse::failure(
                500,
                "internal server error",
                vec![BackendError::new(ErrorCode::BackendServerError, "internal server error")],
            ))),
            Some(Fault::Reject(reason)) => Ok(Some(BackendResponse::failure(
                422,
                reason.clone(),
                vec![BackendError::new(ErrorCode::SyncRejected, reason)],
            ))),
            Some(fault) => Err(Self::transport_error(&fault).await),
        }
    }

    fn query(&self, filter: impl Fn(&OrderSnapshot) -> bool) -> Vec<OrderSnapshot> {
        let mut orders: Vec<OrderSnapshot> = self
            .state
            .lock()
            .orders
            .values()
            .filter(|o| filter(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        orders
    }
}

#[async_trait]
impl BackendClient for InMemoryBackend {
    async fn push_order(&self, order: &OrderSnapshot) -> AppResult<BackendResponse> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let _slot = InFlightPush::enter(&self.pushes_in_flight, &self.peak_pushes_in_flight);
        let started = Instant::now();
        self.gate()?;
        self.simulate_latency().await;

        if let Some(fault) = self.next_push_fault(order.order_id) {
            if let Some((status, error)) = Self::order_rejection(&fault, order.order_id) {
                tracing::debug!(order_id = %order.order_id, status, "Simulated push rejection");
                let message = error.message.clone();
                return Ok(BackendResponse::failure(status, message, vec![error])
                    .with_response_time(Self::elapsed_ms(started)));
            }
            return Err(Self::transport_error(&fault).await);
        }

        let stored = self.store_pushed(order);
        Ok(BackendResponse::success("order accepted", vec![stored])
            .with_response_time(Self::elapsed_ms(started)))
    }

    async fn push_orders(&self, orders: &[OrderSnapshot]) -> AppResult<BackendResponse> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let _slot = InFlightPush::enter(&self.pushes_in_flight, &self.peak_pushes_in_flight);
        let started = Instant::now();
        self.gate()?;

        let max = self.max_batch_size();
        if orders.len() > max {
            return Ok(BackendResponse::failure(
                413,
                format!("batch of {} exceeds maximum of {}", orders.len(), max),
                vec![BackendError::new(ErrorCode::InvalidRequest, "batch too large")],
            ));
        }
        self.simulate_latency().await;

        let mut accepted = Vec::with_capacity(orders.len());
        let mut errors = Vec::new();
        let mut status = 200;
        for order in orders {
            match self.next_push_fault(order.order_id) {
                Some(fault) => match Self::order_rejection(&fault, order.order_id) {
                    Some((code, error)) => {
                        status = status.max(code);
                        errors.push(error);
                    }
                    None => return Err(Self::transport_error(&fault).await),
                },
                None => accepted.push(self.store_pushed(order)),
            }
        }

        let elapsed = Self::elapsed_ms(started);
        if errors.is_empty() {
            return Ok(BackendResponse::success("batch accepted", accepted).with_response_time(elapsed));
        }
        let mut response = BackendResponse::failure(
            status,
            format!("{} of {} orders rejected", errors.len(), orders.len()),
            errors,
        )
        .with_response_time(elapsed);
        response.orders = accepted;
        Ok(response)
    }

    async fn pull_order(&self, order_id: Uuid) -> AppResult<BackendResponse> {
        if let Some(failure) = self.begin_pull().await? {
            return Ok(failure);
        }
        let orders = self.query(|o| o.order_id == order_id);
        let message = if orders.is_empty() { "order not found" } else { "ok" };
        Ok(BackendResponse::success(message, orders))
    }

    async fn pull_orders(&self, order_ids: &[Uuid]) -> AppResult<BackendResponse> {
        if let Some(failure) = self.begin_pull().await? {
            return Ok(failure);
        }
        let orders = self.query(|o| order_ids.contains(&o.order_id));
        Ok(BackendResponse::success(format!("{} orders", orders.len()), orders))
    }

    async fn pull_updated_since(&self, since: DateTime<Utc>) -> AppResult<BackendResponse> {
        if let Some(failure) = self.begin_pull().await? {
            return Ok(failure);
        }
        let orders = self.query(|o| o.updated_at.is_some_and(|u| u > since));
        Ok(BackendResponse::success(format!("{} orders", orders.len()), orders))
    }

    async fn pull_for_passenger(&self, passenger_id: Uuid) -> AppResult<BackendResponse> {
        if let Some(failure) = self.begin_pull().await? {
            return Ok(failure);
        }
        let orders = self.query(|o| o.passenger_id == Some(passenger_id));
        Ok(BackendResponse::success(format!("{} orders", orders.len()), orders))
    }

    async fn pull_for_seat(&self, seat_number: &str) -> AppResult<BackendResponse> {
        if let Some(failure) = self.begin_pull().await? {
            return Ok(failure);
        }
        let orders = self.query(|o| o.seat_number.as_deref() == Some(seat_number));
        Ok(BackendResponse::success(format!("{} orders", orders.len()), orders))
    }

    async fn delete_order(&self, order_id: Uuid) -> AppResult<BackendResponse> {
        self.gate()?;
        self.simulate_latency().await;
        let removed = self.state.lock().orders.remove(&order_id);
        match removed {
            Some(_) => Ok(BackendResponse::success("order deleted", Vec::new())),
            None => Ok(BackendResponse::failure(
                404,
                "order not found",
                vec![BackendError::new(ErrorCode::OrderNotFound, "order not found").for_order(order_id)],
            )),
        }
    }

    async fn is_available(&self) -> bool {
        self.state.lock().available
    }

    async fn check_health(&self) -> HealthStatus {
        let state = self.state.lock();
        if let Some(health) = &state.health {
            return health.clone();
        }
        if state.available {
            HealthStatus::healthy(state.latency.as_millis() as u64, "in-memory")
        } else {
            HealthStatus::unhealthy("backend is unreachable")
        }
    }

    async fn authenticate(&self, credentials: &BackendCredentials) -> AppResult<()> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(AppError::backend_unavailable("backend is unreachable"));
        }
        if !credentials.is_complete() {
            return Err(AppError::new(ErrorCode::InvalidCredentials));
        }
        state.authenticated = true;
        tracing::debug!(credentials = ?credentials, "Simulated backend authenticated");
        Ok(())
    }

    async fn refresh_authentication(&self) -> AppResult<()> {
        let state = self.state.lock();
        if state.refresh_fails {
            return Err(AppError::new(ErrorCode::TokenExpired));
        }
        if state.requires_auth && !state.authenticated {
            return Err(AppError::not_authenticated());
        }
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.state.lock().max_batch_size
    }

    fn rate_limit(&self) -> RateLimit {
        self.state.lock().rate_limit.clone()
    }
}
