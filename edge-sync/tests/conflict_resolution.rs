//! 冲突检测与解决的集成测试
//!
//! 同步运行中的自动解决、人工解决写回、批量策略

mod common;

use std::time::Duration;

use common::{Harness, d, pending_order};
use edge_sync::{
    ConflictDetector, ConflictResolver, EngineError, InMemoryBackend, ResolutionError, SyncConfig,
    SyncEvent,
};
use shared::order::{OrderItem, OrderSnapshot, OrderStatus};
use shared::sync::{
    ConflictInfo, ConflictResolution, ConflictResolutionStrategy, ConflictSeverity, ConflictType,
};
use uuid::Uuid;

/// Both sides touched within the window, nothing visible differs
async fn timestamp_conflict(h: &Harness, seat: &str) -> Uuid {
    let order = h.synced_order(seat).await;
    h.backend
        .apply_remote_change(order.order_id, |o| o.notes = Some("galley note".into()));
    tokio::time::sleep(Duration::from_millis(2)).await;
    let mut local = h.local(order.order_id);
    local.set_notes(Some("crew note".into()));
    h.seed(std::slice::from_ref(&local)).await;
    order.order_id
}

/// Remote confirmed while the local copy was edited
async fn status_conflict(h: &Harness, seat: &str) -> Uuid {
    let order = h.synced_order(seat).await;
    h.backend
        .apply_remote_change(order.order_id, |o| o.status = OrderStatus::Confirmed);
    let mut local = h.local(order.order_id);
    local.set_notes(Some("extra napkins".into()));
    h.seed(std::slice::from_ref(&local)).await;
    order.order_id
}

#[test]
fn test_priority_scenario_prefers_confirmed_copy() {
    let mut local = OrderSnapshot::new(Uuid::new_v4(), "14C");
    local.add_item(OrderItem::new(Uuid::new_v4(), "Pasta", 1, d("14.99")));
    local.add_item(OrderItem::new(Uuid::new_v4(), "Salad", 1, d("10.00")));
    local.set_status(OrderStatus::Confirmed);
    let mut remote = local.clone();
    remote.status = OrderStatus::Pending;
    assert_eq!(local.total_amount, d("24.99"));

    let conflict = ConflictDetector::default()
        .detect(&local, &remote)
        .unwrap()
        .unwrap();
    assert_eq!(conflict.conflict_type, ConflictType::Status);
    assert_eq!(conflict.severity, ConflictSeverity::High);

    let resolution = ConflictResolver::new()
        .resolve(&conflict, ConflictResolutionStrategy::PriorityBased)
        .unwrap();
    assert_eq!(resolution.resolved_order.status, OrderStatus::Confirmed);
    assert!(resolution.automatic);
}

#[test]
fn test_manual_only_strategies_always_fail() {
    let local = pending_order("15A");
    let mut remote = local.clone();
    remote.status = OrderStatus::Confirmed;
    let conflict = ConflictDetector::default()
        .detect(&local, &remote)
        .unwrap()
        .unwrap();

    for strategy in [
        ConflictResolutionStrategy::ManualResolution,
        ConflictResolutionStrategy::CreateNew,
        ConflictResolutionStrategy::Escalate,
    ] {
        let err = ConflictResolver::new().resolve(&conflict, strategy).unwrap_err();
        assert!(matches!(err, ResolutionError::RequiresInput(s) if s == strategy));
    }
    assert!(!conflict.is_resolved());
}

#[test]
fn test_merge_unions_items_and_keeps_larger_quantity() {
    let shared_menu = Uuid::new_v4();
    let mut local = OrderSnapshot::new(Uuid::new_v4(), "16D");
    local.add_item(OrderItem::new(shared_menu, "Tea", 1, d("3.00")));
    local.add_item(OrderItem::new(Uuid::new_v4(), "Scone", 1, d("4.50")));
    local.set_status(OrderStatus::Pending);

    let mut remote = local.clone();
    remote.items.truncate(1);
    remote.items[0].quantity = 3;
    remote.items[0].line_total = d("9.00");
    remote.add_item(OrderItem::new(Uuid::new_v4(), "Cookie", 2, d("2.00")));

    let conflict = ConflictInfo::new(
        local.clone(),
        remote.clone(),
        ConflictType::Delivery,
        ConflictSeverity::Low,
        "delivery drift",
    )
    .unwrap();
    let merged = ConflictResolver::new()
        .resolve(&conflict, ConflictResolutionStrategy::Merge)
        .unwrap()
        .resolved_order;

    assert_eq!(merged.items.len(), 3);
    assert_eq!(merged.find_item(shared_menu).unwrap().quantity, 3);
    assert_eq!(merged.total_amount, d("17.50"));
    assert_eq!(merged.total_amount, merged.computed_total());
}

#[tokio::test]
async fn test_sync_auto_resolves_three_and_surfaces_two() {
    let mut h = Harness::new();
    let mut auto = Vec::new();
    for seat in ["20A", "20B", "20C"] {
        auto.push(timestamp_conflict(&h, seat).await);
    }
    let manual = vec![
        status_conflict(&h, "21A").await,
        status_conflict(&h, "21B").await,
    ];
    h.drain_events();

    let result = h.service.push_changes().await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.conflicts.len(), 5);
    assert_eq!(result.statistics.conflicted_records, 5);
    let mut processed = result.processed_order_ids.clone();
    processed.sort();
    let mut expected = auto.clone();
    expected.sort();
    assert_eq!(processed, expected);

    let unresolved: Vec<Uuid> = result.unresolved_conflicts().map(|c| c.order_id).collect();
    assert_eq!(unresolved.len(), 2);
    assert!(manual.iter().all(|id| unresolved.contains(id)));

    for id in &auto {
        let local = h.local(*id);
        assert!(local.is_synced());
        assert_eq!(
            h.backend.remote_order(*id).unwrap().notes.as_deref(),
            Some("crew note")
        );
    }
    for id in &manual {
        assert!(h.local(*id).needs_sync());
        assert_eq!(h.backend.remote_order(*id).unwrap().notes, None);
    }

    let events = h.drain_events();
    let detected = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::ConflictDetected { .. }))
        .count();
    let resolved = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::ConflictResolved { .. }))
        .count();
    assert_eq!((detected, resolved), (5, 3));

    // Resolved orders stay quiet; unresolved ones are reported again
    let again = h.service.push_changes().await;
    assert_eq!(again.conflicts.len(), 2);
    assert!(again.processed_order_ids.is_empty());
}

#[tokio::test]
async fn test_auto_resolve_disabled_leaves_conflicts() {
    let mut config = SyncConfig::for_tests();
    config.auto_resolve = false;
    let h = Harness::with(InMemoryBackend::new(), config);
    let id = timestamp_conflict(&h, "22A").await;

    let result = h.service.push_changes().await;
    assert!(result.success);
    assert_eq!(result.conflicts.len(), 1);
    assert!(!result.conflicts[0].is_resolved());
    assert!(h.local(id).needs_sync());
}

#[tokio::test]
async fn test_manual_resolution_is_persisted_and_pushed() {
    let h = Harness::new();
    let id = status_conflict(&h, "23A").await;
    let conflict = h.service.push_changes().await.conflicts.remove(0);
    assert_eq!(conflict.order_id, id);

    let mut decided = conflict.remote.clone();
    decided.notes = conflict.local.notes.clone();
    let result = h
        .service
        .resolve_conflict_manually(&conflict, decided, "purser-7", "galley already confirmed")
        .await
        .unwrap();

    assert!(result.success, "{}", result.message);
    assert_eq!(result.processed_order_ids, vec![id]);
    let local = h.local(id);
    assert!(local.is_synced());
    assert_eq!(local.status, OrderStatus::Confirmed);
    let remote = h.backend.remote_order(id).unwrap();
    assert_eq!(remote.status, OrderStatus::Confirmed);
    assert_eq!(remote.notes.as_deref(), Some("extra napkins"));

    let again = h.service.synchronize_all().await;
    assert!(again.success);
    assert!(again.conflicts.is_empty());
    assert!(again.processed_order_ids.is_empty());
}

#[tokio::test]
async fn test_apply_resolution_rejects_foreign_resolution() {
    let h = Harness::new();
    let first = status_conflict(&h, "24A").await;
    let second = status_conflict(&h, "24B").await;
    let conflicts = h.service.push_changes().await.conflicts;
    let a = conflicts.iter().find(|c| c.order_id == first).unwrap();
    let b = conflicts.iter().find(|c| c.order_id == second).unwrap();

    let foreign = ConflictResolution::manual(b, b.remote.clone(), "purser-7", "wrong one");
    let err = h.service.apply_resolution(a, &foreign).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Resolution(ResolutionError::Invalid { order_id, .. }) if order_id == first
    ));
    assert!(h.local(first).needs_sync());
    assert_eq!(h.local(first).status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_resolve_conflicts_batch_strategies() {
    let h = Harness::new();
    let ids = vec![
        status_conflict(&h, "25A").await,
        status_conflict(&h, "25B").await,
    ];
    let conflicts = h.service.push_changes().await.conflicts;
    assert_eq!(conflicts.len(), 2);

    let refused = h
        .service
        .resolve_conflicts(&conflicts, ConflictResolutionStrategy::ManualResolution)
        .await
        .unwrap();
    assert!(!refused.success);
    assert_eq!(refused.unresolved_order_ids.len(), 2);
    assert_eq!(refused.errors.len(), 2);
    for id in &ids {
        assert_eq!(h.local(*id).status, OrderStatus::Pending);
    }

    let accepted = h
        .service
        .resolve_conflicts(&conflicts, ConflictResolutionStrategy::UseRemote)
        .await
        .unwrap();
    assert!(accepted.success);
    assert!(accepted.is_completely_resolved());
    for id in &ids {
        let local = h.local(*id);
        assert_eq!(local.status, OrderStatus::Confirmed);
        assert!(local.needs_sync());
    }

    let pushed = h.service.push_changes().await;
    assert!(pushed.success);
    assert!(pushed.conflicts.is_empty());
    assert_eq!(pushed.processed_count(), 2);
}
