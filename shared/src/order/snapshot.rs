//! Order snapshot - the aggregate exchanged between the local store and the backend
//!
//! Every mutating method keeps `total_amount` equal to the sum of line totals
//! and performs dirty tracking: touching a synced order clears the synced flag
//! and bumps `sync_version`, which is what puts it back into the pending set.

use super::types::{OrderItem, OrderStatus};
use crate::error::{AppError, AppResult, ErrorCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sync bookkeeping carried by every order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncState {
    /// Whether the current version has been accepted by the backend
    pub synced_with_backend: bool,
    /// Backend-assigned reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Local version counter, bumped on every modification after a sync
    pub sync_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_attempt: Option<DateTime<Utc>>,
    /// `updated_at` of the remote copy this order was last reconciled with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_updated_at: Option<DateTime<Utc>>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            synced_with_backend: false,
            external_id: None,
            sync_version: 1,
            last_sync_attempt: None,
            remote_updated_at: None,
        }
    }
}

/// Order snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSnapshot {
    /// Order ID (shared by the local and remote copy)
    pub order_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passenger_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    /// Always the sum of `items[*].line_total`
    pub total_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last modification time (absent on copies that never recorded one)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync: SyncState,
}

impl OrderSnapshot {
    /// Create a new draft order for a passenger seat
    pub fn new(passenger_id: Uuid, seat_number: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), passenger_id, seat_number)
    }

    /// Create a new draft order with a known id
    pub fn with_id(order_id: Uuid, passenger_id: Uuid, seat_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            passenger_id: Some(passenger_id),
            seat_number: Some(seat_number.into()),
            status: OrderStatus::Draft,
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            notes: None,
            created_at: now,
            updated_at: Some(now),
            confirmed_at: None,
            delivered_at: None,
            sync: SyncState::default(),
        }
    }

    // ========== Items ==========

    pub fn add_item(&mut self, item: OrderItem) {
        self.items.push(item);
        self.recalculate_total();
        self.touch();
    }

    /// Remove a line by its line id; returns whether anything was removed
    pub fn remove_item(&mut self, order_item_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.order_item_id != order_item_id);
        if self.items.len() == before {
            return false;
        }
        self.recalculate_total();
        self.touch();
        true
    }

    /// Change the quantity of a line; returns whether the line exists
    pub fn update_item_quantity(&mut self, order_item_id: Uuid, quantity: i32) -> bool {
        let Some(item) = self
            .items
            .iter_mut()
            .find(|i| i.order_item_id == order_item_id)
        else {
            return false;
        };
        item.set_quantity(quantity);
        self.recalculate_total();
        self.touch();
        true
    }

    pub fn find_item(&self, menu_item_id: Uuid) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.menu_item_id == menu_item_id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity as i64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn recalculate_total(&mut self) {
        self.total_amount = self.items.iter().map(|i| i.line_total).sum();
    }

    /// Sum of line totals, independent of the stored total
    pub fn computed_total(&self) -> Decimal {
        self.items.iter().map(|i| i.line_total).sum()
    }

    // ========== Header fields ==========

    pub fn set_passenger(&mut self, passenger_id: Option<Uuid>) {
        self.passenger_id = passenger_id;
        self.touch();
    }

    pub fn set_seat_number(&mut self, seat_number: Option<String>) {
        self.seat_number = seat_number;
        self.touch();
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes;
        self.touch();
    }

    // ========== Status transitions ==========

    /// Set status directly, stamping confirmation / delivery times
    pub fn set_status(&mut self, status: OrderStatus) {
        let now = Utc::now();
        match status {
            OrderStatus::Confirmed if self.confirmed_at.is_none() => {
                self.confirmed_at = Some(now)
            }
            OrderStatus::Delivered if self.delivered_at.is_none() => {
                self.delivered_at = Some(now)
            }
            _ => {}
        }
        self.status = status;
        self.touch();
    }

    /// Draft -> Pending (requires at least one item)
    pub fn submit(&mut self) -> AppResult<()> {
        if self.status != OrderStatus::Draft {
            return Err(self.transition_error("submit"));
        }
        if self.is_empty() {
            return Err(AppError::new(ErrorCode::OrderEmpty)
                .with_detail("order_id", self.order_id.to_string()));
        }
        self.set_status(OrderStatus::Pending);
        Ok(())
    }

    /// Pending -> Confirmed
    pub fn confirm(&mut self) -> AppResult<()> {
        if self.status != OrderStatus::Pending {
            return Err(self.transition_error("confirm"));
        }
        self.set_status(OrderStatus::Confirmed);
        Ok(())
    }

    pub fn cancel(&mut self) -> AppResult<()> {
        if !self.status.is_cancellable() {
            return Err(self.transition_error("cancel"));
        }
        self.set_status(OrderStatus::Cancelled);
        Ok(())
    }

    pub fn is_modifiable(&self) -> bool {
        self.status.is_modifiable()
    }

    pub fn is_cancellable(&self) -> bool {
        self.status.is_cancellable()
    }

    fn transition_error(&self, action: &str) -> AppError {
        AppError::with_message(
            ErrorCode::InvalidRequest,
            format!("Cannot {} order in status {}", action, self.status),
        )
        .with_detail("order_id", self.order_id.to_string())
        .with_detail("status", self.status.display_name())
    }

    // ========== Sync bookkeeping ==========

    /// Not yet accepted by the backend and in a status the backend cares about
    pub fn needs_sync(&self) -> bool {
        !self.sync.synced_with_backend && self.status.requires_sync()
    }

    pub fn is_synced(&self) -> bool {
        self.sync.synced_with_backend
    }

    /// Dirty tracking: a synced order becomes unsynced with a new version
    pub fn mark_as_modified(&mut self) {
        if self.sync.synced_with_backend {
            self.sync.synced_with_backend = false;
            self.sync.sync_version += 1;
        }
    }

    pub fn mark_as_synced(&mut self, external_id: Option<String>) {
        let now = Utc::now();
        self.sync.synced_with_backend = true;
        if external_id.is_some() {
            self.sync.external_id = external_id;
        }
        self.sync.last_sync_attempt = Some(now);
        self.updated_at = Some(now);
    }

    /// Record the remote version this copy now agrees with
    pub fn set_remote_baseline(&mut self, remote_updated_at: Option<DateTime<Utc>>) {
        self.sync.remote_updated_at = remote_updated_at;
    }

    /// The remote copy moved since this order was last reconciled with it
    pub fn remote_changed_since_reconcile(&self, remote: &OrderSnapshot) -> bool {
        self.sync.remote_updated_at.is_none() || self.sync.remote_updated_at != remote.updated_at
    }

    pub fn mark_sync_failed(&mut self) {
        self.sync.last_sync_attempt = Some(Utc::now());
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
        self.mark_as_modified();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn order_with_items() -> OrderSnapshot {
        let mut order = OrderSnapshot::new(Uuid::new_v4(), "12C");
        order.add_item(OrderItem::new(Uuid::new_v4(), "Pasta", 1, d("14.99")));
        order.add_item(OrderItem::new(Uuid::new_v4(), "Juice", 2, d("5.00")));
        order
    }

    #[test]
    fn test_new_order_is_draft() {
        let order = OrderSnapshot::new(Uuid::new_v4(), "1A");
        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(order.total_amount, Decimal::ZERO);
        assert_eq!(order.sync.sync_version, 1);
        assert!(!order.is_synced());
        assert!(!order.needs_sync());
    }

    #[test]
    fn test_total_tracks_items() {
        let mut order = order_with_items();
        assert_eq!(order.total_amount, d("24.99"));

        let juice = order.items[1].order_item_id;
        assert!(order.update_item_quantity(juice, 3));
        assert_eq!(order.total_amount, d("29.99"));

        assert!(order.remove_item(juice));
        assert_eq!(order.total_amount, d("14.99"));
        assert!(!order.remove_item(juice));
        assert!(!order.update_item_quantity(juice, 1));
    }

    #[test]
    fn test_status_transitions() {
        let mut order = OrderSnapshot::new(Uuid::new_v4(), "3F");
        let err = order.submit().unwrap_err();
        assert_eq!(err.code, ErrorCode::OrderEmpty);

        order.add_item(OrderItem::new(Uuid::new_v4(), "Water", 1, d("2")));
        order.submit().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.needs_sync());

        assert!(order.submit().is_err());
        order.confirm().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(order.confirmed_at.is_some());

        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancel().is_err());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut order = order_with_items();
        order.submit().unwrap();
        order.mark_as_synced(Some("EXT-1".to_string()));
        assert!(order.is_synced());
        assert!(!order.needs_sync());
        assert_eq!(order.sync.sync_version, 1);

        order.set_notes(Some("no ice".to_string()));
        assert!(!order.is_synced());
        assert!(order.needs_sync());
        assert_eq!(order.sync.sync_version, 2);

        // Further edits before the next sync keep the same version
        order.set_seat_number(Some("4B".to_string()));
        assert_eq!(order.sync.sync_version, 2);
        assert_eq!(order.sync.external_id.as_deref(), Some("EXT-1"));
    }

    #[test]
    fn test_mark_sync_failed_keeps_unsynced() {
        let mut order = order_with_items();
        order.submit().unwrap();
        order.mark_sync_failed();
        assert!(order.sync.last_sync_attempt.is_some());
        assert!(order.needs_sync());
    }

    #[test]
    fn test_remote_baseline() {
        let mut local = order_with_items();
        let mut remote = local.clone();
        assert!(local.remote_changed_since_reconcile(&remote));

        local.set_remote_baseline(remote.updated_at);
        assert!(!local.remote_changed_since_reconcile(&remote));

        remote.updated_at = remote.updated_at.map(|t| t + chrono::Duration::seconds(5));
        assert!(local.remote_changed_since_reconcile(&remote));
    }

    #[test]
    fn test_serialize_roundtrip_keeps_totals() {
        let order = order_with_items();
        let json = serde_json::to_string(&order).unwrap();
        let back: OrderSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
