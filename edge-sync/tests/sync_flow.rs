//! 同步流程集成测试
//!
//! 推送、拉取、完整同步、分块、幂等与运行拒绝

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{Harness, d, pending_order};
use edge_sync::{ChannelListener, InMemoryBackend, RunState, SyncConfig, SyncEvent};
use shared::error::ErrorCode;
use shared::order::{OrderItem, OrderSnapshot, OrderStatus};
use shared::sync::{HealthLevel, HealthStatus, SyncErrorType, SyncOperation};
use uuid::Uuid;

#[tokio::test]
async fn test_push_changes_syncs_pending_orders() {
    let mut h = Harness::new();
    let orders: Vec<OrderSnapshot> = ["1A", "1B", "1C"].into_iter().map(pending_order).collect();
    let draft = OrderSnapshot::new(Uuid::new_v4(), "1D");
    h.seed(&orders).await;
    h.seed(std::slice::from_ref(&draft)).await;

    let result = h.service.push_changes().await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.operation, SyncOperation::Push);
    assert_eq!(result.processed_count(), 3);
    assert!(result.failed_order_ids.is_empty());
    assert_eq!(result.statistics.total_records, 3);
    assert_eq!(result.statistics.successful_records, 3);
    assert!(result.statistics.bytes_transferred > 0);

    let mut external_ids = HashSet::new();
    for order in &orders {
        let local = h.local(order.order_id);
        assert!(local.is_synced());
        assert!(local.sync.last_sync_attempt.is_some());
        external_ids.insert(local.sync.external_id.clone().unwrap());
    }
    assert_eq!(external_ids.len(), 3);
    assert_eq!(h.backend.remote_count(), 3);
    assert!(!h.local(draft.order_id).is_synced());
    assert_eq!(h.service.pending_sync_count().await.unwrap(), 0);

    let events = h.drain_events();
    assert!(matches!(
        events.first(),
        Some(SyncEvent::SyncStarted { operation: SyncOperation::Push, order_count: 3 })
    ));
    assert!(matches!(events.last(), Some(SyncEvent::SyncCompleted { result }) if result.success));
    let synced = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::OrderSynced { .. }))
        .count();
    assert_eq!(synced, 3);
}

#[tokio::test]
async fn test_rerun_without_changes_is_noop() {
    let mut h = Harness::new();
    h.seed(&[pending_order("2A"), pending_order("2B")]).await;

    let first = h.service.synchronize_all().await;
    assert!(first.success);
    assert_eq!(first.processed_count(), 2);
    let pushes = h.backend.push_calls();
    h.drain_events();

    for _ in 0..2 {
        let again = h.service.synchronize_all().await;
        assert!(again.success);
        assert!(again.processed_order_ids.is_empty());
        assert!(again.conflicts.is_empty());
        assert!(again.errors.is_empty());
    }
    assert_eq!(h.backend.push_calls(), pushes);
    assert!(
        h.drain_events()
            .iter()
            .all(|e| !matches!(e, SyncEvent::ConflictDetected { .. } | SyncEvent::OrderSynced { .. }))
    );
}

#[tokio::test]
async fn test_unavailable_backend_rejects_run_without_mutation() {
    let mut h = Harness::new();
    let orders = vec![pending_order("3A"), pending_order("3B")];
    h.seed(&orders).await;
    h.backend.set_available(false);

    assert!(!h.service.is_sync_available().await);
    let result = h.service.synchronize_all().await;

    assert!(!result.success);
    assert!(result.processed_order_ids.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ErrorCode::SyncUnavailable);
    for order in &orders {
        assert_eq!(&h.local(order.order_id), order);
    }
    assert_eq!(h.backend.push_calls(), 0);
    assert_eq!(h.service.run_state(), RunState::Failed(SyncOperation::FullSync));
    assert!(h.service.last_sync_time().is_none());

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        SyncEvent::SyncFailed { operation: SyncOperation::FullSync, error } if error.code == ErrorCode::SyncUnavailable
    ));
}

#[tokio::test]
async fn test_offline_network_rejects_run() {
    let h = Harness::new();
    h.seed(&[pending_order("4A")]).await;

    h.service.set_network_status(false);
    let result = h.service.push_changes().await;
    assert!(!result.success);
    assert_eq!(result.errors[0].error_type, SyncErrorType::Network);

    h.service.set_network_status(true);
    let result = h.service.push_changes().await;
    assert!(result.success);
    assert_eq!(result.processed_count(), 1);
}

#[tokio::test]
async fn test_push_is_chunked_by_backend_batch_size() {
    let mut h = Harness::with(
        InMemoryBackend::new().with_max_batch_size(2),
        SyncConfig::for_tests(),
    );
    let orders: Vec<OrderSnapshot> = (0..5).map(|i| pending_order(&format!("5{}", i))).collect();
    h.seed(&orders).await;

    let result = h.service.push_changes().await;
    assert!(result.success);
    assert_eq!(result.processed_count(), 5);
    // One remote lookup per chunk
    assert_eq!(h.backend.pull_calls(), 3);

    let progress: Vec<(usize, usize)> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::SyncProgress { completed, total, .. } => Some((completed, total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(2, 5), (4, 5), (5, 5)]);
}

#[tokio::test]
async fn test_batch_reports_missing_and_skips_synced() {
    let h = Harness::new();
    let synced = h.synced_order("6A").await;
    let pending = pending_order("6B");
    h.seed(std::slice::from_ref(&pending)).await;
    let missing = Uuid::new_v4();

    let result = h
        .service
        .synchronize_batch(&[missing, synced.order_id, pending.order_id, pending.order_id])
        .await;

    assert!(!result.success);
    assert_eq!(result.operation, SyncOperation::BatchSync);
    assert_eq!(result.processed_order_ids, vec![pending.order_id]);
    assert_eq!(result.failed_order_ids, vec![missing]);
    assert_eq!(result.errors[0].code, ErrorCode::OrderNotFound);
    assert_eq!(result.errors[0].error_type, SyncErrorType::Data);
    assert!(!result.errors[0].retryable);
    assert_eq!(result.statistics.skipped_records, 1);
    assert_eq!(result.statistics.total_records, 3);
}

#[tokio::test]
async fn test_pull_updates_applies_remote_changes_to_clean_orders() {
    let h = Harness::new();

    let clean = h.synced_order("7A").await;
    let dirty = h.synced_order("7B").await;

    let mut edited = h.local(dirty.order_id);
    edited.set_notes(Some("no ice".into()));
    h.seed(std::slice::from_ref(&edited)).await;

    let remote_only = pending_order("7C");
    h.backend.insert_remote(remote_only.clone());

    assert!(h.backend.apply_remote_change(clean.order_id, |o| o.status = OrderStatus::Confirmed));
    assert!(h.backend.apply_remote_change(dirty.order_id, |o| o.status = OrderStatus::Confirmed));

    let result = h.service.pull_updates().await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.operation, SyncOperation::Pull);

    let processed: HashSet<Uuid> = result.processed_order_ids.iter().copied().collect();
    assert_eq!(processed, HashSet::from([clean.order_id, remote_only.order_id]));
    assert_eq!(result.statistics.total_records, 3);
    assert_eq!(result.statistics.successful_records, 2);
    assert_eq!(result.statistics.skipped_records, 1);

    let refreshed = h.local(clean.order_id);
    assert_eq!(refreshed.status, OrderStatus::Confirmed);
    assert!(refreshed.is_synced());
    assert_eq!(refreshed.sync.external_id, clean.sync.external_id);
    assert_eq!(refreshed.sync.sync_version, clean.sync.sync_version);

    let inserted = h.local(remote_only.order_id);
    assert!(inserted.is_synced());
    assert_eq!(inserted.items, remote_only.items);

    // Dirty copies are left to conflict detection
    let untouched = h.local(dirty.order_id);
    assert_eq!(untouched.status, OrderStatus::Pending);
    assert_eq!(untouched.notes.as_deref(), Some("no ice"));
    assert!(untouched.needs_sync());

    let again = h.service.pull_updates().await;
    assert!(again.success);
    assert!(again.processed_order_ids.is_empty());
}

#[tokio::test]
async fn test_full_sync_pulls_then_pushes() {
    let h = Harness::new();
    let local = pending_order("8A");
    h.seed(std::slice::from_ref(&local)).await;
    let remote_only = pending_order("8B");
    h.backend.insert_remote(remote_only.clone());

    let result = h.service.synchronize_all().await;
    assert!(result.success);
    assert_eq!(result.operation, SyncOperation::FullSync);
    let processed: HashSet<Uuid> = result.processed_order_ids.iter().copied().collect();
    assert_eq!(processed, HashSet::from([local.order_id, remote_only.order_id]));
    assert!(h.local(local.order_id).is_synced());
    assert!(h.local(remote_only.order_id).is_synced());
    assert_eq!(h.backend.remote_count(), 2);
    assert_eq!(h.service.run_state(), RunState::Completed(SyncOperation::FullSync));
    assert!(h.service.last_sync_time().is_some());
}

#[tokio::test]
async fn test_full_sync_counts_each_order_once() {
    let h = Harness::new();

    // Edited on both sides: the pull phase hands it to the push phase
    let both = h.synced_order("8C").await;
    h.backend
        .apply_remote_change(both.order_id, |o| o.notes = Some("galley note".into()));
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let mut edited = h.local(both.order_id);
    edited.set_notes(Some("crew note".into()));
    h.seed(std::slice::from_ref(&edited)).await;

    let clean = h.synced_order("8D").await;
    h.backend
        .apply_remote_change(clean.order_id, |o| o.status = OrderStatus::Confirmed);
    let fresh = pending_order("8E");
    h.seed(std::slice::from_ref(&fresh)).await;

    let result = h.service.synchronize_all().await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.conflicts.len(), 1);

    let stats = &result.statistics;
    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.successful_records, 3);
    assert_eq!(stats.conflicted_records, 1);
    assert_eq!(stats.skipped_records, 0);
    assert_eq!(stats.failed_records, 0);
    assert_eq!(stats.success_rate(), 100.0);
}

#[tokio::test]
async fn test_invalid_orders_fail_validation_and_others_still_sync() {
    let h = Harness::new();
    let good = pending_order("9A");
    let mut broken = pending_order("9B");
    broken.add_item(OrderItem::new(Uuid::new_v4(), "Water", 0, d("2.00")));
    broken.total_amount = d("1.00");
    h.seed(&[good.clone(), broken.clone()]).await;

    let report = h.service.validate_local_data().await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.invalid_order_ids(), vec![broken.order_id]);
    assert!(
        report
            .issues_for(broken.order_id)
            .any(|i| i.code == ErrorCode::OrderItemInvalid)
    );

    let result = h.service.push_changes().await;
    assert!(!result.success);
    assert_eq!(result.processed_order_ids, vec![good.order_id]);
    assert_eq!(result.failed_order_ids, vec![broken.order_id]);
    let error = &result.errors[0];
    assert_eq!(error.error_type, SyncErrorType::Validation);
    assert!(!error.retryable);

    let local = h.local(broken.order_id);
    assert!(local.needs_sync());
    assert!(local.sync.last_sync_attempt.is_some());
    assert!(h.backend.remote_order(broken.order_id).is_none());
}

#[tokio::test]
async fn test_listener_removal_and_status_notifications() {
    let mut h = Harness::new();
    let (extra, mut extra_rx) = ChannelListener::new();
    let extra_id = h.service.add_listener(Arc::new(extra));

    h.service.set_network_status(false);
    h.service.set_network_status(false);
    h.service.set_network_status(true);
    let network: Vec<bool> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::NetworkStatusChanged { online } => Some(online),
            _ => None,
        })
        .collect();
    assert_eq!(network, vec![false, true]);
    assert!(extra_rx.try_recv().is_ok());

    assert!(h.service.remove_listener(extra_id));
    assert!(!h.service.remove_listener(extra_id));
    while extra_rx.try_recv().is_ok() {}

    let first = h.service.check_backend_health().await;
    assert_eq!(first.level, HealthLevel::Good);
    h.service.check_backend_health().await;
    h.backend.set_health(Some(HealthStatus::unhealthy("maintenance")));
    let degraded = h.service.check_backend_health().await;
    assert!(!degraded.healthy);

    let health_events = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::BackendStatusChanged { .. }))
        .count();
    assert_eq!(health_events, 2);
    assert!(extra_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_runs_do_not_double_push() {
    let h = Harness::with(
        InMemoryBackend::new().with_latency(std::time::Duration::from_millis(5)),
        SyncConfig::for_tests(),
    );
    let orders: Vec<OrderSnapshot> = (0..4).map(|i| pending_order(&format!("10{}", i))).collect();
    h.seed(&orders).await;

    let (a, b) = tokio::join!(h.service.push_changes(), h.service.push_changes());
    assert!(a.success && b.success);
    assert_eq!(a.processed_count() + b.processed_count(), 4);
    assert_eq!(h.backend.push_calls(), 4);
}

#[tokio::test]
async fn test_shutdown_rejects_runs() {
    let h = Harness::new();
    h.seed(&[pending_order("11A")]).await;
    h.service.shutdown();

    let result = h.service.push_changes().await;
    assert!(!result.success);
    assert_eq!(result.errors[0].code, ErrorCode::SyncUnavailable);
    assert_eq!(h.backend.push_calls(), 0);
}
