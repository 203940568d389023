//! Structural validation of local orders
//!
//! Runs before every push and backs `SyncService::validate_local_data`.
//! Findings are data errors: the backend would reject the order anyway, so
//! retrying without a local fix is pointless.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::error::ErrorCode;
use shared::order::OrderSnapshot;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub order_id: Uuid,
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Orders examined
    pub checked: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Distinct failing orders, in first-seen order
    pub fn invalid_order_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for issue in &self.issues {
            if !ids.contains(&issue.order_id) {
                ids.push(issue.order_id);
            }
        }
        ids
    }

    pub fn issues_for(&self, order_id: Uuid) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.order_id == order_id)
    }

    pub fn summary(&self) -> String {
        format!(
            "Validated {} orders: {} invalid, {} issues",
            self.checked,
            self.invalid_order_ids().len(),
            self.issues.len()
        )
    }
}

/// Every structural problem of one order
pub fn validate_order(order: &OrderSnapshot) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut push = |code: ErrorCode, message: String| {
        issues.push(ValidationIssue {
            order_id: order.order_id,
            code,
            message,
        })
    };

    if order.passenger_id.is_none() {
        push(ErrorCode::OrderPassengerMissing, "order has no passenger".into());
    }

    if order.items.is_empty() {
        push(ErrorCode::OrderEmpty, "order has no items".into());
    }

    for item in &order.items {
        if item.quantity <= 0 {
            push(
                ErrorCode::OrderItemInvalid,
                format!("item '{}' has non-positive quantity {}", item.menu_item_name, item.quantity),
            );
        }
        if item.unit_price < Decimal::ZERO {
            push(
                ErrorCode::OrderItemInvalid,
                format!("item '{}' has negative price {}", item.menu_item_name, item.unit_price),
            );
        }
        let expected = item.unit_price * Decimal::from(item.quantity);
        if item.line_total != expected {
            push(
                ErrorCode::OrderTotalMismatch,
                format!(
                    "item '{}' line total {} != {}",
                    item.menu_item_name, item.line_total, expected
                ),
            );
        }
    }

    let computed = order.computed_total();
    if order.total_amount != computed {
        push(
            ErrorCode::OrderTotalMismatch,
            format!("order total {} != sum of lines {}", order.total_amount, computed),
        );
    }

    issues
}

pub fn validate_orders<'a>(orders: impl IntoIterator<Item = &'a OrderSnapshot>) -> ValidationReport {
    let mut report = ValidationReport::default();
    for order in orders {
        report.checked += 1;
        report.issues.extend(validate_order(order));
    }
    report
}
