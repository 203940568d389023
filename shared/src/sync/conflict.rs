//! Conflict taxonomy and conflict records
//!
//! All behaviour hanging off the enums is a pure lookup; nothing here talks to
//! a store or the backend.

use crate::error::{AppError, AppResult, ErrorCode};
use crate::order::OrderSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User id recorded on automatic resolutions
pub const SYSTEM_RESOLVER: &str = "SYSTEM";

// ============================================================================
// Conflict Type
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    Status,
    Content,
    Timestamp,
    Deletion,
    Version,
    Confirmation,
    Payment,
    Delivery,
    Passenger,
    Seat,
}

impl ConflictType {
    pub const ALL: [ConflictType; 10] = [
        Self::Status,
        Self::Content,
        Self::Timestamp,
        Self::Deletion,
        Self::Version,
        Self::Confirmation,
        Self::Payment,
        Self::Delivery,
        Self::Passenger,
        Self::Seat,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Status => "Status Conflict",
            Self::Content => "Content Conflict",
            Self::Timestamp => "Timestamp Conflict",
            Self::Deletion => "Deletion Conflict",
            Self::Version => "Version Conflict",
            Self::Confirmation => "Confirmation Conflict",
            Self::Payment => "Payment Conflict",
            Self::Delivery => "Delivery Conflict",
            Self::Passenger => "Passenger Conflict",
            Self::Seat => "Seat Conflict",
        }
    }

    /// Whether this type can be reconciled without human input by default
    pub fn is_auto_resolvable(&self) -> bool {
        matches!(self, Self::Timestamp | Self::Version | Self::Delivery)
    }

    /// Strategy used when the caller does not supply one
    pub fn recommended_strategy(&self) -> ConflictResolutionStrategy {
        match self {
            Self::Timestamp | Self::Version => ConflictResolutionStrategy::LastWriteWins,
            Self::Delivery => ConflictResolutionStrategy::Merge,
            _ => ConflictResolutionStrategy::ManualResolution,
        }
    }

    pub fn affects_order_processing(&self) -> bool {
        matches!(
            self,
            Self::Status | Self::Content | Self::Confirmation | Self::Payment
        )
    }

    pub fn requires_immediate_attention(&self) -> bool {
        matches!(self, Self::Deletion | Self::Confirmation | Self::Payment)
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Conflict Severity
// ============================================================================

/// Ordered: `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    /// 1 (low) ..= 4 (critical)
    pub fn priority(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    pub fn allows_auto_resolution(&self) -> bool {
        matches!(self, Self::Low)
    }

    pub fn requires_user_notification(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    pub fn blocks_sync(&self) -> bool {
        matches!(self, Self::Critical)
    }

    /// Minutes before an unresolved conflict should be escalated, 0 = immediately
    pub fn resolution_timeout_minutes(&self) -> u32 {
        match self {
            Self::Low => 60,
            Self::Medium => 15,
            Self::High => 5,
            Self::Critical => 0,
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Resolution Strategy
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolutionStrategy {
    UseLocal,
    UseRemote,
    LastWriteWins,
    Merge,
    PriorityBased,
    RejectChange,
    ManualResolution,
    CreateNew,
    Escalate,
}

impl ConflictResolutionStrategy {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::UseLocal => "Use Local Version",
            Self::UseRemote => "Use Remote Version",
            Self::LastWriteWins => "Last Write Wins",
            Self::Merge => "Merge Versions",
            Self::PriorityBased => "Priority Based",
            Self::RejectChange => "Reject Change",
            Self::ManualResolution => "Manual Resolution",
            Self::CreateNew => "Create New Version",
            Self::Escalate => "Escalate for Resolution",
        }
    }

    /// Can be computed by the resolver without a human
    pub fn is_automatic(&self) -> bool {
        !self.requires_user_input()
    }

    pub fn requires_user_input(&self) -> bool {
        matches!(
            self,
            Self::ManualResolution | Self::CreateNew | Self::Escalate
        )
    }

    pub fn preserves_local_changes(&self) -> bool {
        matches!(self, Self::UseLocal | Self::Merge | Self::CreateNew)
    }

    pub fn preserves_remote_changes(&self) -> bool {
        matches!(self, Self::UseRemote | Self::Merge | Self::CreateNew)
    }

    /// High and critical conflicts go to a human regardless of type
    pub fn recommended_for(conflict_type: ConflictType, severity: ConflictSeverity) -> Self {
        if severity >= ConflictSeverity::High {
            return Self::ManualResolution;
        }
        conflict_type.recommended_strategy()
    }

    pub fn fallback_strategy(&self) -> Self {
        match self {
            Self::Merge => Self::LastWriteWins,
            Self::PriorityBased => Self::UseRemote,
            _ => Self::ManualResolution,
        }
    }
}

impl fmt::Display for ConflictResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Conflict Resolution
// ============================================================================

/// Outcome of resolving one conflict; immutable once built
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictResolution {
    /// The conflict this resolution settles
    pub conflict_id: Uuid,
    pub order_id: Uuid,
    pub strategy: ConflictResolutionStrategy,
    pub resolved_order: OrderSnapshot,
    pub reason: String,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: String,
    pub automatic: bool,
}

impl ConflictResolution {
    /// Resolution computed by the engine
    pub fn automatic(
        conflict: &ConflictInfo,
        strategy: ConflictResolutionStrategy,
        resolved_order: OrderSnapshot,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            conflict_id: conflict.conflict_id,
            order_id: conflict.order_id,
            strategy,
            resolved_order,
            reason: reason.into(),
            resolved_at: Utc::now(),
            resolved_by: SYSTEM_RESOLVER.to_string(),
            automatic: true,
        }
    }

    /// Resolution supplied by a person
    pub fn manual(
        conflict: &ConflictInfo,
        resolved_order: OrderSnapshot,
        resolved_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            conflict_id: conflict.conflict_id,
            order_id: conflict.order_id,
            strategy: ConflictResolutionStrategy::ManualResolution,
            resolved_order,
            reason: reason.into(),
            resolved_at: Utc::now(),
            resolved_by: resolved_by.into(),
            automatic: false,
        }
    }

    pub fn description(&self) -> String {
        let mut desc = format!("Resolved using {}", self.strategy.display_name());
        if self.automatic {
            desc.push_str(" (automatic)");
        } else {
            desc.push_str(&format!(" (manual by {})", self.resolved_by));
        }
        if !self.reason.trim().is_empty() {
            desc.push_str(": ");
            desc.push_str(&self.reason);
        }
        desc
    }
}

// ============================================================================
// Conflict Info
// ============================================================================

/// A detected divergence between the local and remote copy of one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictInfo {
    pub conflict_id: Uuid,
    pub order_id: Uuid,
    pub local: OrderSnapshot,
    pub remote: OrderSnapshot,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    /// Only ever set once, by [`ConflictInfo::attach_resolution`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
}

impl ConflictInfo {
    /// Build a conflict record; both snapshots must share the order id
    pub fn new(
        local: OrderSnapshot,
        remote: OrderSnapshot,
        conflict_type: ConflictType,
        severity: ConflictSeverity,
        description: impl Into<String>,
    ) -> AppResult<Self> {
        if local.order_id != remote.order_id {
            return Err(AppError::new(ErrorCode::ConflictIdMismatch)
                .with_detail("local_order_id", local.order_id.to_string())
                .with_detail("remote_order_id", remote.order_id.to_string()));
        }
        Ok(Self {
            conflict_id: Uuid::new_v4(),
            order_id: local.order_id,
            local,
            remote,
            conflict_type,
            severity,
            description: description.into(),
            detected_at: Utc::now(),
            resolution: None,
        })
    }

    /// Type is auto-resolvable and severity is below high
    pub fn is_auto_resolvable(&self) -> bool {
        self.conflict_type.is_auto_resolvable() && self.severity < ConflictSeverity::High
    }

    pub fn recommended_strategy(&self) -> ConflictResolutionStrategy {
        self.conflict_type.recommended_strategy()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Attach the resolution; a resolution for another conflict is refused
    pub fn attach_resolution(&mut self, resolution: ConflictResolution) -> AppResult<()> {
        if resolution.conflict_id != self.conflict_id {
            return Err(AppError::with_message(
                ErrorCode::ResolutionInvalid,
                "Resolution belongs to a different conflict",
            )
            .with_detail("conflict_id", self.conflict_id.to_string()));
        }
        if self.resolution.is_some() {
            return Err(AppError::with_message(
                ErrorCode::ResolutionInvalid,
                "Conflict already resolved",
            )
            .with_detail("conflict_id", self.conflict_id.to_string()));
        }
        self.resolution = Some(resolution);
        Ok(())
    }
}

// ============================================================================
// Batch resolution result
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConflictResolutionResult {
    pub success: bool,
    pub resolved_order_ids: Vec<Uuid>,
    pub unresolved_order_ids: Vec<Uuid>,
    pub resolutions: Vec<ConflictResolution>,
    pub errors: Vec<String>,
    pub message: String,
}

impl ConflictResolutionResult {
    pub fn total_conflicts(&self) -> usize {
        self.resolved_order_ids.len() + self.unresolved_order_ids.len()
    }

    pub fn is_completely_resolved(&self) -> bool {
        self.success && self.unresolved_order_ids.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Resolved {}/{} conflicts ({} unresolved, {} errors)",
            self.resolved_order_ids.len(),
            self.total_conflicts(),
            self.unresolved_order_ids.len(),
            self.errors.len()
        )
    }
}
