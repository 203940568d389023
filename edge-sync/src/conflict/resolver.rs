//! Conflict resolution
//!
//! Produces a single reconciled order per conflict. Strategies that need a
//! human (manual resolution, create-new, escalate) are refused; a person
//! supplies the order through [`ConflictResolver::resolve_manually`] instead.

use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::order::OrderSnapshot;
use shared::sync::{
    ConflictInfo, ConflictResolution, ConflictResolutionResult, ConflictResolutionStrategy,
};
use thiserror::Error;
use uuid::Uuid;

use super::merge::{merge_orders, select_by_priority, select_by_timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("strategy '{0}' requires manual input")]
    RequiresInput(ConflictResolutionStrategy),

    #[error("resolved order {order_id} failed validation: {reason}")]
    Invalid { order_id: Uuid, reason: String },

    #[error("conflict {0} is already resolved")]
    AlreadyResolved(Uuid),
}

impl ResolutionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ResolutionError::RequiresInput(_) => ErrorCode::ResolutionRequiresInput,
            ResolutionError::Invalid { .. } | ResolutionError::AlreadyResolved(_) => {
                ErrorCode::ResolutionInvalid
            }
        }
    }
}

/// Stateless conflict resolver
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve one conflict with the given strategy
    pub fn resolve(
        &self,
        conflict: &ConflictInfo,
        strategy: ConflictResolutionStrategy,
    ) -> Result<ConflictResolution, ResolutionError> {
        if conflict.is_resolved() {
            return Err(ResolutionError::AlreadyResolved(conflict.conflict_id));
        }

        let local = &conflict.local;
        let remote = &conflict.remote;

        let (resolved, reason) = match strategy {
            ConflictResolutionStrategy::UseLocal => {
                (local.clone(), "Local version selected".to_string())
            }
            ConflictResolutionStrategy::UseRemote => {
                (remote.clone(), "Remote version selected".to_string())
            }
            ConflictResolutionStrategy::LastWriteWins => (
                select_by_timestamp(local, remote).clone(),
                "Selected version with most recent timestamp".to_string(),
            ),
            ConflictResolutionStrategy::Merge => (
                merge_orders(local, remote),
                "Merged local and remote items".to_string(),
            ),
            ConflictResolutionStrategy::PriorityBased => (
                select_by_priority(local, remote).clone(),
                "Selected version with higher business priority".to_string(),
            ),
            ConflictResolutionStrategy::RejectChange => (
                remote.clone(),
                "Local change rejected, remote version kept".to_string(),
            ),
            ConflictResolutionStrategy::ManualResolution
            | ConflictResolutionStrategy::CreateNew
            | ConflictResolutionStrategy::Escalate => {
                tracing::debug!(
                    order_id = %conflict.order_id,
                    strategy = %strategy,
                    "Strategy needs human input"
                );
                return Err(ResolutionError::RequiresInput(strategy));
            }
        };

        self.validate_resolution(&resolved, conflict)?;

        tracing::info!(
            order_id = %conflict.order_id,
            conflict_type = %conflict.conflict_type,
            strategy = %strategy,
            "Conflict resolved"
        );

        Ok(ConflictResolution::automatic(conflict, strategy, resolved, reason))
    }

    /// Resolve with the conflict type's recommended strategy
    pub fn resolve_with_recommended(
        &self,
        conflict: &ConflictInfo,
    ) -> Result<ConflictResolution, ResolutionError> {
        self.resolve(conflict, conflict.recommended_strategy())
    }

    /// Record a resolution chosen by a person
    pub fn resolve_manually(
        &self,
        conflict: &ConflictInfo,
        resolved_order: OrderSnapshot,
        resolved_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<ConflictResolution, ResolutionError> {
        if conflict.is_resolved() {
            return Err(ResolutionError::AlreadyResolved(conflict.conflict_id));
        }
        self.validate_resolution(&resolved_order, conflict)?;
        let resolution = ConflictResolution::manual(conflict, resolved_order, resolved_by, reason);
        tracing::info!(
            order_id = %conflict.order_id,
            resolved_by = %resolution.resolved_by,
            "Conflict resolved manually"
        );
        Ok(resolution)
    }

    /// Apply one strategy to every conflict independently
    ///
    /// Success requires every conflict to resolve.
    pub fn resolve_batch(
        &self,
        conflicts: &[ConflictInfo],
        strategy: ConflictResolutionStrategy,
    ) -> ConflictResolutionResult {
        let mut result = ConflictResolutionResult::default();

        for conflict in conflicts {
            match self.resolve(conflict, strategy) {
                Ok(resolution) => {
                    result.resolved_order_ids.push(conflict.order_id);
                    result.resolutions.push(resolution);
                }
                Err(e) => {
                    result.unresolved_order_ids.push(conflict.order_id);
                    result
                        .errors
                        .push(format!("Order {}: {}", conflict.order_id, e));
                }
            }
        }

        result.success = result.unresolved_order_ids.is_empty();
        result.message = format!(
            "Resolved {} of {} conflicts using {}",
            result.resolved_order_ids.len(),
            conflicts.len(),
            strategy
        );
        result
    }

    /// Resolve what qualifies for automatic resolution
    ///
    /// Only conflicts whose type is auto-resolvable and whose severity is below
    /// high are attempted, each with its recommended strategy. The rest are
    /// reported unresolved without being attempted. Success means no attempted
    /// resolution failed.
    pub fn auto_resolve(&self, conflicts: &[ConflictInfo]) -> ConflictResolutionResult {
        let mut result = ConflictResolutionResult::default();
        let mut attempted_failures = 0usize;

        for conflict in conflicts {
            if !conflict.is_auto_resolvable() {
                result.unresolved_order_ids.push(conflict.order_id);
                continue;
            }
            match self.resolve_with_recommended(conflict) {
                Ok(resolution) => {
                    result.resolved_order_ids.push(conflict.order_id);
                    result.resolutions.push(resolution);
                }
                Err(e) => {
                    attempted_failures += 1;
                    tracing::warn!(
                        order_id = %conflict.order_id,
                        error = %e,
                        "Automatic resolution failed"
                    );
                    result.unresolved_order_ids.push(conflict.order_id);
                    result
                        .errors
                        .push(format!("Order {}: {}", conflict.order_id, e));
                }
            }
        }

        result.success = attempted_failures == 0;
        result.message = format!(
            "Auto-resolved {} of {} conflicts",
            result.resolved_order_ids.len(),
            conflicts.len()
        );
        result
    }

    /// Mandatory checks before a resolution is accepted
    pub fn validate_resolution(
        &self,
        resolved: &OrderSnapshot,
        conflict: &ConflictInfo,
    ) -> Result<(), ResolutionError> {
        let invalid = |reason: &str| ResolutionError::Invalid {
            order_id: conflict.order_id,
            reason: reason.to_string(),
        };

        if resolved.order_id != conflict.order_id {
            return Err(invalid("order id does not match the conflict"));
        }
        if resolved.passenger_id.is_none() {
            return Err(invalid("passenger is missing"));
        }
        if resolved.items.is_empty() {
            return Err(invalid("order has no items"));
        }
        if resolved.total_amount < Decimal::ZERO {
            return Err(invalid("total is negative"));
        }
        Ok(())
    }
}
