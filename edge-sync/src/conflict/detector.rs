//! Conflict detection between the local and remote copy of an order
//!
//! Checks run in a fixed priority order and the first match wins:
//! status, content, timestamp, deletion, confirmation, passenger, seat.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::order::{OrderItem, OrderSnapshot, OrderStatus};
use shared::sync::{ConflictInfo, ConflictSeverity, ConflictType};
use thiserror::Error;
use uuid::Uuid;

use crate::core::SyncConfig;

/// Default timestamp coincidence window
pub const DEFAULT_CONFLICT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    #[error("orders must have the same id (local {local}, remote {remote})")]
    IdMismatch { local: Uuid, remote: Uuid },
}

impl DetectionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DetectionError::IdMismatch { .. } => ErrorCode::ConflictIdMismatch,
        }
    }
}

/// Pure, non-blocking conflict detector
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    timestamp_window: chrono::Duration,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFLICT_WINDOW)
    }
}

impl ConflictDetector {
    pub fn new(timestamp_window: Duration) -> Self {
        Self {
            timestamp_window: chrono::Duration::from_std(timestamp_window)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.conflict_window())
    }

    /// Compare two copies of the same order
    ///
    /// Returns `Ok(None)` when the copies agree on everything checked.
    pub fn detect(
        &self,
        local: &OrderSnapshot,
        remote: &OrderSnapshot,
    ) -> Result<Option<ConflictInfo>, DetectionError> {
        if local.order_id != remote.order_id {
            return Err(DetectionError::IdMismatch {
                local: local.order_id,
                remote: remote.order_id,
            });
        }

        let Some((conflict_type, severity, description)) = self.classify(local, remote) else {
            return Ok(None);
        };

        tracing::debug!(
            order_id = %local.order_id,
            conflict_type = %conflict_type,
            severity = %severity,
            "Conflict detected"
        );

        ConflictInfo::new(
            local.clone(),
            remote.clone(),
            conflict_type,
            severity,
            description,
        )
        .map(Some)
        .map_err(|_| DetectionError::IdMismatch {
            local: local.order_id,
            remote: remote.order_id,
        })
    }

    /// Pair local and remote copies by order id and detect each pair
    ///
    /// Orders present on only one side are not conflicts.
    pub fn detect_batch(&self, local: &[OrderSnapshot], remote: &[OrderSnapshot]) -> Vec<ConflictInfo> {
        let remote_by_id: HashMap<Uuid, &OrderSnapshot> =
            remote.iter().map(|o| (o.order_id, o)).collect();

        local
            .iter()
            .filter_map(|l| {
                let r = remote_by_id.get(&l.order_id)?;
                // Paired by id, so the only error variant cannot occur
                self.detect(l, r).ok().flatten()
            })
            .collect()
    }

    fn classify(
        &self,
        local: &OrderSnapshot,
        remote: &OrderSnapshot,
    ) -> Option<(ConflictType, ConflictSeverity, String)> {
        if local.status != remote.status {
            return Some((
                ConflictType::Status,
                ConflictSeverity::High,
                format!("Status conflict: local={}, remote={}", local.status, remote.status),
            ));
        }

        if content_differs(local, remote) {
            let delta = (local.total_amount - remote.total_amount).abs();
            return Some((
                ConflictType::Content,
                content_severity(delta),
                format!(
                    "Order content differs between local and remote versions (total delta {})",
                    delta
                ),
            ));
        }

        if self.timestamps_coincide(local, remote) {
            return Some((
                ConflictType::Timestamp,
                ConflictSeverity::Medium,
                "Modification timestamps indicate concurrent updates".to_string(),
            ));
        }

        if local.status == OrderStatus::Cancelled && remote.status != OrderStatus::Cancelled {
            return Some((
                ConflictType::Deletion,
                ConflictSeverity::High,
                "Order cancelled locally but still active remotely".to_string(),
            ));
        }

        if local.status.is_confirmed_state() != remote.status.is_confirmed_state() {
            return Some((
                ConflictType::Confirmation,
                ConflictSeverity::High,
                "Order confirmation status conflicts".to_string(),
            ));
        }

        if local.passenger_id != remote.passenger_id {
            return Some((
                ConflictType::Passenger,
                ConflictSeverity::High,
                "Passenger assignment differs between versions".to_string(),
            ));
        }

        if local.seat_number != remote.seat_number {
            return Some((
                ConflictType::Seat,
                ConflictSeverity::High,
                format!(
                    "Seat assignment differs: local={}, remote={}",
                    local.seat_number.as_deref().unwrap_or("-"),
                    remote.seat_number.as_deref().unwrap_or("-")
                ),
            ));
        }

        None
    }

    /// Both timestamps present, distinct, and closer than the window
    ///
    /// Identical timestamps mean the same edit seen twice, not two edits.
    /// This deliberately narrows the plain `|Δ| < window` rule, where a zero
    /// difference would also count: an unchanged pair would otherwise flag a
    /// timestamp conflict on every pass.
    fn timestamps_coincide(&self, local: &OrderSnapshot, remote: &OrderSnapshot) -> bool {
        match (local.updated_at, remote.updated_at) {
            (Some(l), Some(r)) if l != r => (l - r).abs() < self.timestamp_window,
            _ => false,
        }
    }
}

/// Total, item count, or any line (matched by menu item) differs
fn content_differs(local: &OrderSnapshot, remote: &OrderSnapshot) -> bool {
    if local.total_amount != remote.total_amount || local.items.len() != remote.items.len() {
        return true;
    }

    // Multiset comparison so repeated menu items are matched one-to-one
    let mut unmatched: Vec<&OrderItem> = remote.items.iter().collect();
    for item in &local.items {
        match unmatched.iter().position(|r| item.same_line(r)) {
            Some(idx) => {
                unmatched.swap_remove(idx);
            }
            None => return true,
        }
    }
    false
}

fn content_severity(total_delta: Decimal) -> ConflictSeverity {
    if total_delta > Decimal::from(50) {
        ConflictSeverity::High
    } else if total_delta > Decimal::from(10) {
        ConflictSeverity::Medium
    } else {
        ConflictSeverity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Pending order with two items; remote is an exact copy
    fn pair() -> (OrderSnapshot, OrderSnapshot) {
        let mut local = OrderSnapshot::new(Uuid::new_v4(), "14A");
        local.add_item(OrderItem::new(Uuid::new_v4(), "Chicken Wrap", 1, d("14.99")));
        local.add_item(OrderItem::new(Uuid::new_v4(), "Orange Juice", 2, d("5.00")));
        local.set_status(OrderStatus::Pending);
        let remote = local.clone();
        (local, remote)
    }

    #[test]
    fn test_identical_copies_do_not_conflict() {
        let (local, remote) = pair();
        let detector = ConflictDetector::default();
        assert!(detector.detect(&local, &remote).unwrap().is_none());
    }

    #[test]
    fn test_mismatched_ids_is_an_error() {
        let (local, _) = pair();
        let (other, _) = pair();
        let err = ConflictDetector::default().detect(&local, &other).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConflictIdMismatch);
    }

    #[test]
    fn test_status_only_difference_is_high_status_conflict() {
        let (mut local, remote) = pair();
        local.status = OrderStatus::Confirmed;

        let conflict = ConflictDetector::default()
            .detect(&local, &remote)
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Status);
        assert_eq!(conflict.severity, ConflictSeverity::High);
        assert_eq!(conflict.order_id, local.order_id);
    }

    #[test]
    fn test_quantity_change_severity_thresholds() {
        let detector = ConflictDetector::default();

        // (unit price, new quantity, expected severity); original quantity is 1
        let cases = [
            ("5.00", 2, ConflictSeverity::Low),     // delta 5
            ("10.00", 2, ConflictSeverity::Low),    // delta 10, not > 10
            ("10.01", 2, ConflictSeverity::Medium), // delta 10.01
            ("25.00", 3, ConflictSeverity::Medium), // delta 50, not > 50
            ("25.00", 4, ConflictSeverity::High),   // delta 75
        ];

        for (price, qty, expected) in cases {
            let mut local = OrderSnapshot::new(Uuid::new_v4(), "2C");
            local.add_item(OrderItem::new(Uuid::new_v4(), "Meal", 1, d(price)));
            let mut remote = local.clone();
            let line = remote.items[0].order_item_id;
            remote.update_item_quantity(line, qty);
            // Same modification time so only the content check can fire
            remote.updated_at = local.updated_at;

            let conflict = detector.detect(&local, &remote).unwrap().unwrap();
            assert_eq!(conflict.conflict_type, ConflictType::Content);
            assert_eq!(conflict.severity, expected, "price {price} qty {qty}");
        }
    }

    #[test]
    fn test_same_total_different_items_is_content_conflict() {
        let (local, mut remote) = pair();
        // Swap one line for a different menu item with the same line total
        remote.items[0].menu_item_id = Uuid::new_v4();

        let conflict = ConflictDetector::default()
            .detect(&local, &remote)
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Content);
        assert_eq!(conflict.severity, ConflictSeverity::Low);
    }

    #[test]
    fn test_timestamp_window() {
        let (local, mut remote) = pair();
        let base = local.updated_at.unwrap();

        remote.updated_at = Some(base + chrono::Duration::seconds(30));
        let conflict = ConflictDetector::default()
            .detect(&local, &remote)
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Timestamp);
        assert_eq!(conflict.severity, ConflictSeverity::Medium);

        remote.updated_at = Some(base + chrono::Duration::seconds(90));
        assert!(ConflictDetector::default().detect(&local, &remote).unwrap().is_none());

        // A narrower window no longer flags 30s apart
        remote.updated_at = Some(base + chrono::Duration::seconds(30));
        let narrow = ConflictDetector::new(Duration::from_secs(10));
        assert!(narrow.detect(&local, &remote).unwrap().is_none());

        // Missing timestamp never coincides
        remote.updated_at = None;
        assert!(ConflictDetector::default().detect(&local, &remote).unwrap().is_none());
    }

    #[test]
    fn test_passenger_and_seat_conflicts() {
        let (local, mut remote) = pair();
        remote.passenger_id = Some(Uuid::new_v4());
        let conflict = ConflictDetector::default()
            .detect(&local, &remote)
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Passenger);
        assert_eq!(conflict.severity, ConflictSeverity::High);

        let (local, mut remote) = pair();
        remote.passenger_id = None;
        let conflict = ConflictDetector::default()
            .detect(&local, &remote)
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Passenger);

        let (local, mut remote) = pair();
        remote.seat_number = Some("15B".into());
        let conflict = ConflictDetector::default()
            .detect(&local, &remote)
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Seat);
    }

    #[test]
    fn test_status_takes_priority_over_content() {
        let (mut local, remote) = pair();
        local.status = OrderStatus::Cancelled;
        local.items.clear();
        local.recalculate_total();
        let conflict = ConflictDetector::default()
            .detect(&local, &remote)
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Status);
    }

    #[test]
    fn test_detect_batch_pairs_by_id() {
        let (mut a_local, a_remote) = pair();
        a_local.status = OrderStatus::Confirmed;
        let (b_local, b_remote) = pair();
        let (local_only, _) = pair();
        let (_, remote_only) = pair();

        let conflicts = ConflictDetector::default().detect_batch(
            &[a_local.clone(), b_local, local_only],
            &[remote_only, b_remote, a_remote],
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].order_id, a_local.order_id);
        assert!(conflicts[0].detected_at <= Utc::now());
    }
}
