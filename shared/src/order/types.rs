//! Order status and line item types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Order Status
// ============================================================================

/// Order status (closed set)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Draft,
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Preparing => "Preparing",
            Self::Ready => "Ready",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Items can still be added or removed
    pub fn is_modifiable(&self) -> bool {
        matches!(self, Self::Draft | Self::Pending)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Draft | Self::Pending | Self::Confirmed)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Delivered | Self::Failed)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Statuses whose unsynced changes must reach the backend
    pub fn requires_sync(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Cancelled)
    }

    /// Confirmed-or-delivered, the "committed by the kitchen" side of a confirmation conflict
    pub fn is_confirmed_state(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Delivered)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Order Item
// ============================================================================

/// Line item of an order
///
/// `line_total` is always `unit_price * quantity`; mutate through
/// [`OrderItem::set_quantity`] / [`OrderItem::set_unit_price`] to keep it so.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    /// Line id (local identity of this line)
    pub order_item_id: Uuid,
    /// Menu item reference, the key used to match lines across copies
    pub menu_item_id: Uuid,
    /// Menu item name snapshot (kept for offline display)
    pub menu_item_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl OrderItem {
    pub fn new(
        menu_item_id: Uuid,
        menu_item_name: impl Into<String>,
        quantity: i32,
        unit_price: Decimal,
    ) -> Self {
        Self {
            order_item_id: Uuid::new_v4(),
            menu_item_id,
            menu_item_name: menu_item_name.into(),
            quantity,
            unit_price,
            line_total: unit_price * Decimal::from(quantity),
            special_instructions: None,
        }
    }

    pub fn set_quantity(&mut self, quantity: i32) {
        self.quantity = quantity;
        self.recalculate_line_total();
    }

    pub fn set_unit_price(&mut self, unit_price: Decimal) {
        self.unit_price = unit_price;
        self.recalculate_line_total();
    }

    pub fn recalculate_line_total(&mut self) {
        self.line_total = self.unit_price * Decimal::from(self.quantity);
    }

    /// Same menu item, quantity and unit price
    ///
    /// Line ids and names are local presentation details and are not compared.
    pub fn same_line(&self, other: &OrderItem) -> bool {
        self.menu_item_id == other.menu_item_id
            && self.quantity == other.quantity
            && self.unit_price == other.unit_price
    }
}
