//! 同步编排服务
//!
//! # 运行流程
//!
//! ```text
//! run lock ──▶ 可用性检查 ──▶ 刷新认证 ──▶ pull 阶段 (full / pull)
//!                                      └──▶ push 阶段 (按 max_batch_size 分块)
//!
//! push 阶段，每个分块:
//! 锁定订单 ─▶ 拉取远端副本 ─▶ 冲突检测 ─▶ 自动解决 ─▶ 本地校验 ─▶ 并发推送 ─▶ 回写
//! ```
//!
//! 同一时刻只有一个运行；其余请求在 run lock 上排队。
//! 单个订单的失败只记录在结果中，不会中断整个运行。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use parking_lot::{Mutex, RwLock};
use shared::error::{AppError, ErrorCode};
use shared::order::{OrderSnapshot, SyncState};
use shared::util::elapsed_millis;
use shared::sync::{
    BackendCredentials, BackendResponse, ConflictInfo, ConflictResolution,
    ConflictResolutionResult, ConflictResolutionStrategy, HealthLevel, HealthStatus, SyncError,
    SyncErrorType, SyncOperation, SyncResult,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::conflict::{ConflictDetector, ConflictResolver, ResolutionError};
use crate::core::{EngineError, EngineResult, SyncConfig};
use crate::listener::{ListenerId, ListenerRegistry, SyncEvent, SyncListener};
use crate::store::OrderStore;

use super::retry::{CallContext, CallFailure, RetryPolicy, call_with_retry};
use super::state::{OrderLocks, RunState};
use super::stats::StatsCollector;
use super::validation::{ValidationReport, validate_order, validate_orders};

/// 运行范围
enum RunScope {
    /// 所有待同步订单
    Pending,
    /// 只拉取远端更新
    Pull,
    /// 先拉取再推送
    Full,
    /// 指定订单
    Orders(Vec<Uuid>),
}

/// 一次运行的累积结果
#[derive(Default)]
struct RunOutcome {
    processed: Vec<Uuid>,
    failed: Vec<Uuid>,
    errors: Vec<SyncError>,
    conflicts: Vec<ConflictInfo>,
    /// 出现了不属于单个订单的失败 (例如 pull 阶段)
    run_failed: bool,
    /// 已计入总数的订单
    counted: HashSet<Uuid>,
    /// pull 阶段留给 push 阶段处理的订单
    deferred: HashSet<Uuid>,
    /// 本次运行在 pull 之后还有 push 阶段
    push_follows: bool,
}

impl RunOutcome {
    /// 同一订单在一次运行中只计入一次总数
    fn count(&mut self, order_id: Uuid, stats: &StatsCollector) {
        if self.counted.insert(order_id) {
            stats.add_total(1);
        }
    }

    /// 交给 push 阶段；没有 push 阶段时直接记为跳过
    fn defer(&mut self, order_id: Uuid, stats: &StatsCollector) {
        if self.push_follows {
            self.deferred.insert(order_id);
        } else {
            stats.record_skipped();
        }
    }
}

/// 同步编排服务
///
/// 通过构造参数注入本地存储和后端客户端；监听器随时增删。
pub struct SyncService {
    config: SyncConfig,
    store: Arc<dyn OrderStore>,
    backend: Arc<dyn BackendClient>,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    retry_policy: RetryPolicy,
    listeners: ListenerRegistry,
    /// 运行互斥
    run_lock: tokio::sync::Mutex<()>,
    run_state: RwLock<RunState>,
    order_locks: OrderLocks,
    network_online: AtomicBool,
    last_health_level: Mutex<Option<HealthLevel>>,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
    /// 上次成功 pull 的起始时间，作为下次增量拉取的 since
    last_pull_time: RwLock<Option<DateTime<Utc>>>,
    shutdown: CancellationToken,
    current_run: Mutex<Option<CancellationToken>>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn OrderStore>,
        backend: Arc<dyn BackendClient>,
    ) -> Self {
        Self {
            detector: ConflictDetector::from_config(&config),
            resolver: ConflictResolver::new(),
            retry_policy: RetryPolicy::from_config(&config),
            config,
            store,
            backend,
            listeners: ListenerRegistry::new(),
            run_lock: tokio::sync::Mutex::new(()),
            run_state: RwLock::new(RunState::Idle),
            order_locks: OrderLocks::new(),
            network_online: AtomicBool::new(true),
            last_health_level: Mutex::new(None),
            last_sync_time: RwLock::new(None),
            last_pull_time: RwLock::new(None),
            shutdown: CancellationToken::new(),
            current_run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ========== 同步运行 ==========

    /// 完整同步：先拉取远端更新，再推送本地变更
    pub async fn synchronize_all(&self) -> SyncResult {
        self.run(SyncOperation::FullSync, RunScope::Full).await
    }

    /// 推送所有待同步订单
    pub async fn push_changes(&self) -> SyncResult {
        self.run(SyncOperation::Push, RunScope::Pending).await
    }

    /// 拉取上次同步以来的远端更新
    pub async fn pull_updates(&self) -> SyncResult {
        self.run(SyncOperation::Pull, RunScope::Pull).await
    }

    pub async fn synchronize_order(&self, order_id: Uuid) -> SyncResult {
        self.run(SyncOperation::SingleOrder, RunScope::Orders(vec![order_id]))
            .await
    }

    pub async fn synchronize_batch(&self, order_ids: &[Uuid]) -> SyncResult {
        self.run(SyncOperation::BatchSync, RunScope::Orders(order_ids.to_vec()))
            .await
    }

    // ========== 冲突处理 ==========

    /// 用同一策略解决一批冲突，并把成功的解决结果写回本地存储
    ///
    /// 写回的订单处于待同步状态，由下一次推送送达后端。
    pub async fn resolve_conflicts(
        &self,
        conflicts: &[ConflictInfo],
        strategy: ConflictResolutionStrategy,
    ) -> EngineResult<ConflictResolutionResult> {
        let result = self.resolver.resolve_batch(conflicts, strategy);
        let by_id: HashMap<Uuid, &ConflictInfo> =
            conflicts.iter().map(|c| (c.conflict_id, c)).collect();

        for resolution in &result.resolutions {
            if let Some(conflict) = by_id.get(&resolution.conflict_id) {
                self.persist_resolution(conflict, resolution).await?;
            }
        }

        tracing::info!(
            strategy = %strategy,
            summary = %result.summary(),
            "Batch conflict resolution finished"
        );
        Ok(result)
    }

    /// 写回一个解决结果并立即推送该订单
    pub async fn apply_resolution(
        &self,
        conflict: &ConflictInfo,
        resolution: &ConflictResolution,
    ) -> EngineResult<SyncResult> {
        if conflict.is_resolved() {
            return Err(ResolutionError::AlreadyResolved(conflict.conflict_id).into());
        }
        self.persist_resolution(conflict, resolution).await?;
        Ok(self.synchronize_order(conflict.order_id).await)
    }

    /// 人工给出解决后的订单
    pub async fn resolve_conflict_manually(
        &self,
        conflict: &ConflictInfo,
        resolved_order: OrderSnapshot,
        resolved_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> EngineResult<SyncResult> {
        let resolution =
            self.resolver
                .resolve_manually(conflict, resolved_order, resolved_by, reason)?;
        self.apply_resolution(conflict, &resolution).await
    }

    // ========== 状态查询 ==========

    /// 网络在线且后端可达
    pub async fn is_sync_available(&self) -> bool {
        !self.shutdown.is_cancelled()
            && self.network_online.load(Ordering::SeqCst)
            && self.backend.is_available().await
    }

    /// 上次成功运行的完成时间
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_time.read()
    }

    pub async fn pending_sync_count(&self) -> EngineResult<usize> {
        self.store
            .find_orders_requiring_sync()
            .await
            .map(|orders| orders.len())
            .map_err(EngineError::Store)
    }

    /// 对待同步订单做结构校验
    pub async fn validate_local_data(&self) -> EngineResult<ValidationReport> {
        let pending = self
            .store
            .find_orders_requiring_sync()
            .await
            .map_err(EngineError::Store)?;
        let report = validate_orders(&pending);
        if report.is_valid() {
            tracing::debug!(checked = report.checked, "Local data valid");
        } else {
            tracing::warn!(summary = %report.summary(), "Local data has invalid orders");
        }
        Ok(report)
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.read()
    }

    // ========== 网络与后端状态 ==========

    /// 变化时通知监听器
    pub fn set_network_status(&self, online: bool) {
        let previous = self.network_online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(online, "Network status changed");
            self.emit(SyncEvent::NetworkStatusChanged { online });
        }
    }

    pub fn is_network_online(&self) -> bool {
        self.network_online.load(Ordering::SeqCst)
    }

    /// 查询后端健康状态，级别变化时通知监听器
    pub async fn check_backend_health(&self) -> HealthStatus {
        let health = self.backend.check_health().await;
        let changed = {
            let mut last = self.last_health_level.lock();
            let changed = *last != Some(health.level);
            *last = Some(health.level);
            changed
        };
        if changed {
            tracing::info!(
                level = %health.level,
                healthy = health.healthy,
                "Backend health changed"
            );
            self.emit(SyncEvent::BackendStatusChanged {
                health: health.clone(),
            });
        }
        health
    }

    pub async fn authenticate(&self, credentials: &BackendCredentials) -> EngineResult<()> {
        self.backend
            .authenticate(credentials)
            .await
            .map_err(EngineError::Backend)
    }

    // ========== 监听器 ==========

    pub fn add_listener(&self, listener: Arc<dyn SyncListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ========== 取消与关闭 ==========

    /// 取消正在进行的运行；已提交的推送保持不变
    pub fn cancel_current_run(&self) -> bool {
        match self.current_run.lock().as_ref() {
            Some(token) => {
                tracing::info!("Cancelling current sync run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消当前运行并拒绝之后的所有运行
    pub fn shutdown(&self) {
        tracing::info!("Sync service shutting down");
        self.shutdown.cancel();
    }

    // ========== 运行生命周期 ==========

    async fn run(&self, operation: SyncOperation, scope: RunScope) -> SyncResult {
        let _run_guard = self.run_lock.lock().await;

        let cancel = self.shutdown.child_token();
        *self.current_run.lock() = Some(cancel.clone());
        *self.run_state.write() = RunState::Running(operation);
        tracing::info!(operation = %operation, "Sync run started");

        let stats = StatsCollector::start();
        let result = self.execute(operation, scope, &cancel, &stats).await;

        *self.current_run.lock() = None;
        self.order_locks.prune();
        *self.run_state.write() = if result.success {
            RunState::Completed(operation)
        } else {
            RunState::Failed(operation)
        };
        if result.success {
            *self.last_sync_time.write() = Some(result.timestamp);
        }

        tracing::info!(
            operation = %operation,
            success = result.success,
            processed = result.processed_count(),
            failed = result.failed_count(),
            conflicts = result.conflicts.len(),
            duration_ms = result.statistics.duration_ms(),
            "Sync run finished"
        );
        result
    }

    async fn execute(
        &self,
        operation: SyncOperation,
        scope: RunScope,
        cancel: &CancellationToken,
        stats: &StatsCollector,
    ) -> SyncResult {
        if let Err(error) = self.preflight().await {
            return self.reject(operation, error, stats);
        }

        let full = matches!(scope, RunScope::Full);
        let mut out = RunOutcome {
            push_follows: full,
            ..RunOutcome::default()
        };

        match scope {
            RunScope::Pull => {
                self.emit(SyncEvent::SyncStarted {
                    operation,
                    order_count: 0,
                });
                self.pull_phase(operation, cancel, stats, &mut out).await;
            }
            RunScope::Pending | RunScope::Full => {
                let pending = match self.store.find_orders_requiring_sync().await {
                    Ok(orders) => orders,
                    Err(e) => {
                        let error = SyncError::from_app_error(None, &e, self.backoff_secs());
                        return self.reject(operation, error, stats);
                    }
                };
                self.emit(SyncEvent::SyncStarted {
                    operation,
                    order_count: pending.len(),
                });

                let pending = if full {
                    self.pull_phase(operation, cancel, stats, &mut out).await;
                    // Fresh copies for the push phase
                    match self.store.find_orders_requiring_sync().await {
                        Ok(orders) => orders,
                        Err(e) => {
                            let error = SyncError::from_app_error(None, &e, self.backoff_secs());
                            self.fail_order(error, stats, &mut out);
                            Vec::new()
                        }
                    }
                } else {
                    pending
                };
                self.push_phase(operation, pending, cancel, stats, &mut out)
                    .await;
                // Pulled orders the push phase never picked up
                std::mem::take(&mut out.deferred)
                    .iter()
                    .for_each(|_| stats.record_skipped());
            }
            RunScope::Orders(ids) => {
                self.emit(SyncEvent::SyncStarted {
                    operation,
                    order_count: ids.len(),
                });
                let orders = self.load_requested(&ids, stats, &mut out).await;
                self.push_phase(operation, orders, cancel, stats, &mut out)
                    .await;
            }
        }

        self.finish(operation, out, cancel, stats)
    }

    /// 运行前检查：服务未关闭、网络与后端可用、认证有效
    async fn preflight(&self) -> Result<(), SyncError> {
        if self.shutdown.is_cancelled() {
            return Err(coded(
                SyncError::new(None, SyncErrorType::Network, "Sync service is shut down")
                    .with_retryable(false),
                ErrorCode::SyncUnavailable,
            ));
        }
        if !self.is_sync_available().await {
            return Err(coded(
                SyncError::new(
                    None,
                    SyncErrorType::Network,
                    "Sync unavailable: offline or backend unreachable",
                ),
                ErrorCode::SyncUnavailable,
            ));
        }
        if let Err(e) = self.backend.refresh_authentication().await {
            return Err(coded(
                SyncError::authentication(
                    None,
                    format!("Backend authentication failed: {}", e.message),
                )
                .with_cause(&e),
                e.code,
            ));
        }
        Ok(())
    }

    fn reject(
        &self,
        operation: SyncOperation,
        error: SyncError,
        stats: &StatsCollector,
    ) -> SyncResult {
        tracing::warn!(operation = %operation, error = %error, "Sync run rejected");
        self.emit(SyncEvent::SyncFailed {
            operation,
            error: error.clone(),
        });
        SyncResult::rejected(
            operation,
            error.message.clone(),
            vec![error],
            stats.finish(),
        )
    }

    fn finish(
        &self,
        operation: SyncOperation,
        mut out: RunOutcome,
        cancel: &CancellationToken,
        stats: &StatsCollector,
    ) -> SyncResult {
        let cancelled = cancel.is_cancelled();
        let statistics = stats.finish();
        let unresolved = out.conflicts.iter().filter(|c| !c.is_resolved()).count();

        let cancel_error = cancelled.then(|| {
            coded(
                SyncError::new(None, SyncErrorType::Unknown, "Sync run cancelled"),
                ErrorCode::SyncCancelled,
            )
        });
        if let Some(error) = &cancel_error {
            out.errors.push(error.clone());
        }

        let message = if cancelled {
            format!(
                "{} cancelled after {} orders synced",
                operation,
                out.processed.len()
            )
        } else {
            format!(
                "{} finished: {} synced, {} failed, {} unresolved conflicts, {} skipped",
                operation,
                out.processed.len(),
                out.failed.len(),
                unresolved,
                statistics.skipped_records
            )
        };

        let result = SyncResult {
            success: !cancelled && !out.run_failed && out.failed.is_empty(),
            operation,
            timestamp: Utc::now(),
            processed_order_ids: out.processed,
            failed_order_ids: out.failed,
            errors: out.errors,
            conflicts: out.conflicts,
            statistics,
            message,
        };

        match cancel_error {
            Some(error) => self.emit(SyncEvent::SyncFailed { operation, error }),
            None => self.emit(SyncEvent::SyncCompleted {
                result: Box::new(result.clone()),
            }),
        }
        result
    }

    // ========== Pull 阶段 ==========

    /// 拉取远端更新并写入干净的本地订单
    ///
    /// - 本地不存在：作为已同步订单插入
    /// - 本地已同步且远端有变化：替换为远端副本
    /// - 本地有未同步修改：跳过，交给 push 阶段的冲突检测
    async fn pull_phase(
        &self,
        operation: SyncOperation,
        cancel: &CancellationToken,
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) {
        let since = self.last_pull_time.read().unwrap_or(DateTime::<Utc>::MIN_UTC);
        let pull_started = Utc::now();
        let backend = &self.backend;

        let response = call_with_retry(
            self.call_ctx(cancel),
            None,
            |_, _| stats.record_retry(),
            move || async move {
                stats.record_request();
                let response = backend.pull_updated_since(since).await?;
                if response.success {
                    Ok(response)
                } else {
                    Err(response_error(&response, None))
                }
            },
        )
        .await;

        let response = match response {
            Ok(response) => response,
            Err(CallFailure::Cancelled) => return,
            Err(CallFailure::Failed(error)) => {
                tracing::warn!(error = %error, "Pull phase failed");
                self.fail_order(error, stats, out);
                return;
            }
        };

        stats.record_transfer(&response.orders);
        let total = response.orders.len();
        tracing::debug!(
            since = %since,
            received = total,
            elapsed_ms = elapsed_millis(pull_started),
            "Pulled remote updates"
        );

        for (idx, remote) in response.orders.iter().enumerate() {
            out.count(remote.order_id, stats);
            if cancel.is_cancelled() {
                out.defer(remote.order_id, stats);
                continue;
            }
            let guard = self.order_locks.lock(remote.order_id).await;
            self.apply_pulled(remote, stats, out).await;
            drop(guard);
            self.emit(SyncEvent::SyncProgress {
                operation,
                completed: idx + 1,
                total,
            });
        }

        if !cancel.is_cancelled() {
            *self.last_pull_time.write() = Some(pull_started);
        }
    }

    async fn apply_pulled(
        &self,
        remote: &OrderSnapshot,
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) {
        let order_id = remote.order_id;
        let local = match self.store.find_by_id(order_id).await {
            Ok(local) => local,
            Err(e) => {
                let error = SyncError::from_app_error(Some(order_id), &e, self.backoff_secs());
                self.fail_order(error, stats, out);
                return;
            }
        };

        let updated = match local {
            None => {
                let mut copy = remote.clone();
                copy.sync.synced_with_backend = true;
                copy.set_remote_baseline(remote.updated_at);
                copy
            }
            Some(local) if !local.is_synced() => {
                tracing::debug!(order_id = %order_id, "Local copy has unsynced changes, left to push phase");
                out.defer(order_id, stats);
                return;
            }
            Some(local) if !local.remote_changed_since_reconcile(remote) => {
                stats.record_skipped();
                return;
            }
            Some(local) => {
                let mut copy = remote.clone();
                copy.sync = SyncState {
                    synced_with_backend: true,
                    external_id: remote
                        .sync
                        .external_id
                        .clone()
                        .or_else(|| local.sync.external_id.clone()),
                    sync_version: local.sync.sync_version,
                    last_sync_attempt: local.sync.last_sync_attempt,
                    remote_updated_at: remote.updated_at,
                };
                copy
            }
        };

        match self.store.save(&updated).await {
            Ok(()) => {
                stats.record_success();
                out.processed.push(order_id);
                self.emit(SyncEvent::OrderSynced {
                    order_id,
                    external_id: updated.sync.external_id.clone(),
                });
            }
            Err(e) => {
                let error = SyncError::from_app_error(Some(order_id), &e, self.backoff_secs());
                self.fail_order(error, stats, out);
            }
        }
    }

    // ========== Push 阶段 ==========

    /// 载入指定订单；不存在的订单记为失败，无需同步的记为跳过
    async fn load_requested(
        &self,
        order_ids: &[Uuid],
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) -> Vec<OrderSnapshot> {
        let mut seen = HashSet::new();
        let mut orders = Vec::with_capacity(order_ids.len());

        for &order_id in order_ids {
            if !seen.insert(order_id) {
                continue;
            }
            match self.store.find_by_id(order_id).await {
                Ok(Some(order)) if order.needs_sync() => orders.push(order),
                Ok(Some(_)) => {
                    out.count(order_id, stats);
                    stats.record_skipped();
                    tracing::debug!(order_id = %order_id, "Order already in sync");
                }
                Ok(None) => {
                    out.count(order_id, stats);
                    let error = coded(
                        SyncError::data(
                            order_id,
                            "Order not found in local store",
                            format!("order_id={}", order_id),
                        ),
                        ErrorCode::OrderNotFound,
                    );
                    self.fail_order(error, stats, out);
                }
                Err(e) => {
                    out.count(order_id, stats);
                    let error = SyncError::from_app_error(Some(order_id), &e, self.backoff_secs());
                    self.fail_order(error, stats, out);
                }
            }
        }
        orders
    }

    async fn push_phase(
        &self,
        operation: SyncOperation,
        orders: Vec<OrderSnapshot>,
        cancel: &CancellationToken,
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) {
        let total = orders.len();
        for order in &orders {
            out.count(order.order_id, stats);
            out.deferred.remove(&order.order_id);
        }
        if total == 0 {
            return;
        }

        let chunk_size = self.backend.max_batch_size().max(1);
        let mut completed = 0;

        for chunk in orders.chunks(chunk_size) {
            if cancel.is_cancelled() {
                chunk.iter().for_each(|_| stats.record_skipped());
                continue;
            }
            self.push_chunk(chunk, cancel, stats, out).await;
            completed += chunk.len();
            self.emit(SyncEvent::SyncProgress {
                operation,
                completed,
                total,
            });
        }
    }

    async fn push_chunk(
        &self,
        chunk: &[OrderSnapshot],
        cancel: &CancellationToken,
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) {
        let ids: Vec<Uuid> = chunk.iter().map(|o| o.order_id).collect();
        let _guards = tokio::select! {
            _ = cancel.cancelled() => {
                chunk.iter().for_each(|_| stats.record_skipped());
                return;
            }
            guards = self.order_locks.lock_all(&ids) => guards,
        };

        // Re-read under the lock; a resolution may have landed meanwhile
        let mut locals = Vec::with_capacity(chunk.len());
        for order in chunk {
            match self.store.find_by_id(order.order_id).await {
                Ok(Some(current)) if current.needs_sync() => locals.push(current),
                Ok(_) => stats.record_skipped(),
                Err(e) => {
                    let error =
                        SyncError::from_app_error(Some(order.order_id), &e, self.backoff_secs());
                    self.fail_order(error, stats, out);
                }
            }
        }
        if locals.is_empty() {
            return;
        }

        let local_ids: Vec<Uuid> = locals.iter().map(|o| o.order_id).collect();
        let remotes = match self.fetch_remote_copies(&local_ids, cancel, stats).await {
            Ok(remotes) => remotes,
            Err(CallFailure::Cancelled) => {
                locals.iter().for_each(|_| stats.record_skipped());
                return;
            }
            Err(CallFailure::Failed(error)) => {
                for local in &locals {
                    let mut error = error.clone();
                    error.order_id = Some(local.order_id);
                    self.record_push_failure(error, stats, out).await;
                }
                return;
            }
        };

        let mut to_push = Vec::with_capacity(locals.len());
        let mut detected = Vec::new();
        for local in locals {
            let Some(remote) = remotes.get(&local.order_id) else {
                to_push.push(local);
                continue;
            };
            if !local.remote_changed_since_reconcile(remote) {
                to_push.push(local);
                continue;
            }
            match self.detector.detect(&local, remote) {
                Ok(Some(conflict)) => detected.push((local, conflict)),
                Ok(None) => to_push.push(local),
                Err(e) => {
                    let error = coded(
                        SyncError::conflict(local.order_id, e.to_string()).with_retryable(false),
                        e.code(),
                    );
                    self.record_push_failure(error, stats, out).await;
                }
            }
        }

        if !detected.is_empty() {
            let resolved = self.handle_conflicts(detected, stats, out).await;
            to_push.extend(resolved);
        }

        let mut valid = Vec::with_capacity(to_push.len());
        for order in to_push {
            let issues = validate_order(&order);
            let Some(first) = issues.first() else {
                valid.push(order);
                continue;
            };
            let details = issues
                .iter()
                .map(|i| i.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let error = coded(
                SyncError::validation(order.order_id, "Order failed validation before push", details)
                    .with_retryable(false),
                first.code,
            );
            self.record_push_failure(error, stats, out).await;
        }
        if valid.is_empty() {
            return;
        }

        let rate_limit = self.backend.rate_limit();
        let allowance = rate_limit.concurrency_allowance();
        if allowance == 0 {
            let retry_after = if rate_limit.retry_after_secs > 0 {
                rate_limit.retry_after_secs
            } else {
                self.backoff_secs()
            };
            tracing::warn!(
                retry_after_secs = retry_after,
                orders = valid.len(),
                "Backend rate limit exhausted, deferring pushes"
            );
            for order in valid {
                let error = SyncError::rate_limited(Some(order.order_id), retry_after);
                self.record_push_failure(error, stats, out).await;
            }
            return;
        }
        let concurrency = self.config.max_concurrent_pushes.min(allowance).max(1);

        let results: Vec<(OrderSnapshot, Result<BackendResponse, CallFailure>)> =
            stream::iter(valid)
                .map(|order| async move {
                    let result = self.push_one(&order, cancel, stats).await;
                    (order, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        for (order, result) in results {
            match result {
                Ok(response) => self.record_push_success(order, response, stats, out).await,
                Err(CallFailure::Cancelled) => {
                    stats.record_skipped();
                    tracing::debug!(order_id = %order.order_id, "Push cancelled, order stays pending");
                }
                Err(CallFailure::Failed(error)) => {
                    self.record_push_failure(error, stats, out).await
                }
            }
        }
    }

    async fn fetch_remote_copies(
        &self,
        order_ids: &[Uuid],
        cancel: &CancellationToken,
        stats: &StatsCollector,
    ) -> Result<HashMap<Uuid, OrderSnapshot>, CallFailure> {
        let backend = &self.backend;
        let response = call_with_retry(
            self.call_ctx(cancel),
            None,
            |_, _| stats.record_retry(),
            move || async move {
                stats.record_request();
                let response = backend.pull_orders(order_ids).await?;
                if response.success {
                    Ok(response)
                } else {
                    Err(response_error(&response, None))
                }
            },
        )
        .await?;

        stats.record_transfer(&response.orders);
        Ok(response
            .orders
            .into_iter()
            .map(|o| (o.order_id, o))
            .collect())
    }

    /// 通知、自动解决、写回；返回可以推送的已解决订单
    async fn handle_conflicts(
        &self,
        detected: Vec<(OrderSnapshot, ConflictInfo)>,
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) -> Vec<OrderSnapshot> {
        for (_, conflict) in &detected {
            stats.record_conflict();
            tracing::info!(
                order_id = %conflict.order_id,
                conflict_type = %conflict.conflict_type,
                severity = %conflict.severity,
                "Conflict detected"
            );
            self.emit(SyncEvent::ConflictDetected {
                conflict: Box::new(conflict.clone()),
            });
        }

        let (locals, conflicts): (Vec<OrderSnapshot>, Vec<ConflictInfo>) =
            detected.into_iter().unzip();

        if !self.config.auto_resolve {
            out.conflicts.extend(conflicts);
            return Vec::new();
        }

        let batch = self.resolver.auto_resolve(&conflicts);
        let mut resolutions: HashMap<Uuid, ConflictResolution> = batch
            .resolutions
            .into_iter()
            .map(|r| (r.conflict_id, r))
            .collect();
        for error in &batch.errors {
            tracing::warn!(error = %error, "Automatic resolution failed");
        }

        let mut ready = Vec::new();
        for (local, mut conflict) in locals.into_iter().zip(conflicts) {
            let Some(resolution) = resolutions.remove(&conflict.conflict_id) else {
                tracing::info!(
                    order_id = %conflict.order_id,
                    conflict_type = %conflict.conflict_type,
                    "Conflict left for manual resolution"
                );
                out.conflicts.push(conflict);
                continue;
            };

            let adopted = adopt_resolution(&local, &conflict, &resolution);
            match self.store.save(&adopted).await {
                Ok(()) => {
                    self.emit(SyncEvent::ConflictResolved {
                        conflict: Box::new(conflict.clone()),
                        resolution: Box::new(resolution.clone()),
                    });
                    if let Err(e) = conflict.attach_resolution(resolution) {
                        tracing::warn!(order_id = %conflict.order_id, error = %e, "Could not attach resolution");
                    }
                    ready.push(adopted);
                }
                Err(e) => {
                    let error =
                        SyncError::from_app_error(Some(conflict.order_id), &e, self.backoff_secs());
                    self.fail_order(error, stats, out);
                }
            }
            out.conflicts.push(conflict);
        }
        ready
    }

    async fn push_one(
        &self,
        order: &OrderSnapshot,
        cancel: &CancellationToken,
        stats: &StatsCollector,
    ) -> Result<BackendResponse, CallFailure> {
        let backend = &self.backend;
        let order_id = order.order_id;

        call_with_retry(
            self.call_ctx(cancel),
            Some(order_id),
            |attempt, error| {
                stats.record_retry();
                self.emit(SyncEvent::RetryAttempt {
                    order_id,
                    attempt,
                    error: error.clone(),
                });
            },
            move || async move {
                stats.record_request();
                stats.record_transfer([order]);
                let response = backend.push_order(order).await?;
                if response.success {
                    Ok(response)
                } else {
                    Err(response_error(&response, Some(order_id)))
                }
            },
        )
        .await
    }

    /// 标记已同步；推送期间被修改过的订单保持待同步
    async fn record_push_success(
        &self,
        pushed: OrderSnapshot,
        response: BackendResponse,
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) {
        let order_id = pushed.order_id;
        let external_id = response.external_id_for(order_id);
        let remote_copy = response.order(order_id);
        if let Some(copy) = remote_copy {
            stats.record_transfer([copy]);
        }
        let remote_updated_at = remote_copy
            .and_then(|o| o.updated_at)
            .or(pushed.updated_at);

        match self.store.find_by_id(order_id).await {
            Ok(Some(mut current)) => {
                let untouched = current.updated_at == pushed.updated_at
                    && current.sync.sync_version == pushed.sync.sync_version;
                if untouched {
                    current.mark_as_synced(external_id.clone());
                } else {
                    tracing::debug!(order_id = %order_id, "Order changed during push, keeping it pending");
                    if external_id.is_some() {
                        current.sync.external_id = external_id.clone();
                    }
                    current.sync.last_sync_attempt = Some(Utc::now());
                }
                current.set_remote_baseline(remote_updated_at);
                if let Err(e) = self.store.save(&current).await {
                    let error = SyncError::from_app_error(Some(order_id), &e, self.backoff_secs());
                    self.fail_order(error, stats, out);
                    return;
                }
            }
            Ok(None) => {
                tracing::debug!(order_id = %order_id, "Order removed locally during push");
            }
            Err(e) => {
                let error = SyncError::from_app_error(Some(order_id), &e, self.backoff_secs());
                self.fail_order(error, stats, out);
                return;
            }
        }

        stats.record_success();
        out.processed.push(order_id);
        tracing::debug!(order_id = %order_id, external_id = ?external_id, "Order synced");
        self.emit(SyncEvent::OrderSynced {
            order_id,
            external_id,
        });
    }

    async fn record_push_failure(
        &self,
        error: SyncError,
        stats: &StatsCollector,
        out: &mut RunOutcome,
    ) {
        if let Some(order_id) = error.order_id {
            match self.store.find_by_id(order_id).await {
                Ok(Some(mut current)) => {
                    current.mark_sync_failed();
                    if let Err(e) = self.store.save(&current).await {
                        tracing::warn!(order_id = %order_id, error = %e, "Could not record sync attempt");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Could not load order to record sync attempt");
                }
            }
        }
        tracing::warn!(
            order_id = ?error.order_id,
            error_type = %error.error_type,
            category = error.code.category().name(),
            retryable = error.retryable,
            error = %error,
            "Order sync failed"
        );
        self.fail_order(error, stats, out);
    }

    fn fail_order(&self, error: SyncError, stats: &StatsCollector, out: &mut RunOutcome) {
        stats.record_failure();
        match error.order_id {
            Some(order_id) => {
                if !out.failed.contains(&order_id) {
                    out.failed.push(order_id);
                }
                self.emit(SyncEvent::OrderSyncFailed {
                    order_id,
                    error: error.clone(),
                });
            }
            None => out.run_failed = true,
        }
        out.errors.push(error);
    }

    // ========== 冲突解决写回 ==========

    async fn persist_resolution(
        &self,
        conflict: &ConflictInfo,
        resolution: &ConflictResolution,
    ) -> EngineResult<OrderSnapshot> {
        if resolution.conflict_id != conflict.conflict_id
            || resolution.order_id != conflict.order_id
        {
            return Err(ResolutionError::Invalid {
                order_id: conflict.order_id,
                reason: "resolution belongs to a different conflict".into(),
            }
            .into());
        }

        let guard = self.order_locks.lock(conflict.order_id).await;
        let local = self
            .store
            .find_by_id(conflict.order_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::OrderNotFound(conflict.order_id))?;

        let adopted = adopt_resolution(&local, conflict, resolution);
        self.store
            .save(&adopted)
            .await
            .map_err(EngineError::Store)?;
        drop(guard);
        self.order_locks.prune();

        tracing::info!(
            order_id = %conflict.order_id,
            strategy = %resolution.strategy,
            resolved_by = %resolution.resolved_by,
            "Conflict resolution applied"
        );
        self.emit(SyncEvent::ConflictResolved {
            conflict: Box::new(conflict.clone()),
            resolution: Box::new(resolution.clone()),
        });
        Ok(adopted)
    }

    // ========== 工具 ==========

    fn call_ctx<'a>(&'a self, cancel: &'a CancellationToken) -> CallContext<'a> {
        CallContext {
            policy: &self.retry_policy,
            timeout: self.config.request_timeout(),
            rate_limit_backoff_secs: self.backoff_secs(),
            cancel,
        }
    }

    fn backoff_secs(&self) -> u64 {
        self.config.rate_limit_backoff_secs
    }

    fn emit(&self, event: SyncEvent) {
        tracing::trace!(event = event.name(), order_id = ?event.order_id(), "Sync event");
        self.listeners.notify(&event);
    }
}

/// 把解决结果变成待推送的本地订单
///
/// 保留本地同步记录，标记为未同步，并以冲突时的远端版本作为基线，
/// 使同一远端副本不会再次触发冲突。
fn adopt_resolution(
    local: &OrderSnapshot,
    conflict: &ConflictInfo,
    resolution: &ConflictResolution,
) -> OrderSnapshot {
    let mut adopted = resolution.resolved_order.clone();
    adopted.sync = local.sync.clone();
    adopted.mark_as_modified();
    adopted.sync.synced_with_backend = false;
    adopted.updated_at = Some(Utc::now());
    adopted.set_remote_baseline(conflict.remote.updated_at);
    adopted
}

fn coded(mut error: SyncError, code: ErrorCode) -> SyncError {
    error.code = code;
    error
}

/// 失败响应转换为错误，优先取针对该订单的错误
fn response_error(response: &BackendResponse, order_id: Option<Uuid>) -> AppError {
    let specific = order_id.and_then(|id| response.error_for(id));
    match specific.or_else(|| response.general_error()) {
        Some(error) => error.to_app_error(),
        None => AppError::with_message(
            status_error_code(response.status_code),
            response.message.clone(),
        ),
    }
}

fn status_error_code(status: u16) -> ErrorCode {
    match status {
        401 | 403 => ErrorCode::NotAuthenticated,
        404 => ErrorCode::OrderNotFound,
        409 => ErrorCode::ConflictDetected,
        422 => ErrorCode::SyncRejected,
        429 => ErrorCode::RateLimited,
        400..=499 => ErrorCode::InvalidRequest,
        _ => ErrorCode::BackendServerError,
    }
}
