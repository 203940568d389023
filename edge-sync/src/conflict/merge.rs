//! Order selection and merge helpers used by the resolver
//!
//! All functions are pure and never block.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use shared::order::{OrderItem, OrderSnapshot, OrderStatus};
use uuid::Uuid;

/// Side with the later `updated_at`
///
/// A missing timestamp is older than any present one; with both missing the
/// local copy wins. Equal timestamps also keep the local copy.
pub fn select_by_timestamp<'a>(local: &'a OrderSnapshot, remote: &'a OrderSnapshot) -> &'a OrderSnapshot {
    match (local.updated_at, remote.updated_at) {
        (None, None) => local,
        (None, Some(_)) => remote,
        (Some(_), None) => local,
        (Some(l), Some(r)) => {
            if r > l {
                remote
            } else {
                local
            }
        }
    }
}

/// Status weight + 5 per item + floor(total / 10)
pub fn priority_score(order: &OrderSnapshot) -> i64 {
    let status_weight = match order.status {
        OrderStatus::Confirmed => 100,
        OrderStatus::Pending => 50,
        OrderStatus::Draft => 10,
        _ => 0,
    };
    let item_weight = order.items.len() as i64 * 5;
    let total_weight = (order.total_amount / Decimal::TEN)
        .floor()
        .to_i64()
        .unwrap_or(0);
    status_weight + item_weight + total_weight
}

/// Higher priority score wins; ties fall back to [`select_by_timestamp`]
pub fn select_by_priority<'a>(local: &'a OrderSnapshot, remote: &'a OrderSnapshot) -> &'a OrderSnapshot {
    let local_score = priority_score(local);
    let remote_score = priority_score(remote);
    match local_score.cmp(&remote_score) {
        std::cmp::Ordering::Greater => local,
        std::cmp::Ordering::Less => remote,
        std::cmp::Ordering::Equal => select_by_timestamp(local, remote),
    }
}

/// Merge two copies of an order
///
/// Header fields come from the last-write-wins side. Items are the union of
/// both sides keyed by menu item. A menu item on both sides takes every line
/// from the side with the larger summed quantity (local on ties), so repeated
/// lines of one item are never collapsed. The total is recomputed from the
/// merged items.
pub fn merge_orders(local: &OrderSnapshot, remote: &OrderSnapshot) -> OrderSnapshot {
    let base = select_by_timestamp(local, remote);
    let mut merged = base.clone();

    let mut seen = HashSet::new();
    let mut items: Vec<OrderItem> = Vec::with_capacity(local.items.len() + remote.items.len());

    for item in local.items.iter().chain(remote.items.iter()) {
        let menu_item_id = item.menu_item_id;
        if !seen.insert(menu_item_id) {
            continue;
        }
        let source = if quantity_of(local, menu_item_id) >= quantity_of(remote, menu_item_id) {
            local
        } else {
            remote
        };
        for line in source.items.iter().filter(|i| i.menu_item_id == menu_item_id) {
            let mut line = line.clone();
            line.recalculate_line_total();
            items.push(line);
        }
    }

    merged.items = items;
    merged.recalculate_total();
    merged.updated_at = Some(Utc::now());
    merged
}

/// Summed quantity of every line for one menu item
fn quantity_of(order: &OrderSnapshot, menu_item_id: Uuid) -> i64 {
    order
        .items
        .iter()
        .filter(|i| i.menu_item_id == menu_item_id)
        .map(|i| i64::from(i.quantity))
        .sum()
}
