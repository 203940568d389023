//! Unified error codes for order synchronization
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 4xxx: Order errors
//! - 6xxx: Sync errors
//! - 7xxx: Conflict errors
//! - 8xxx: Backend errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for compact serialization
/// in sync reports and listener payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Auth ====================
    /// Backend session is not authenticated
    NotAuthenticated = 1001,
    /// Credentials rejected by the backend
    InvalidCredentials = 1002,
    /// Token has expired
    TokenExpired = 1003,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order has no items
    OrderEmpty = 4002,
    /// Order total does not match its line items
    OrderTotalMismatch = 4003,
    /// Order item is invalid (quantity / price)
    OrderItemInvalid = 4004,
    /// Order has no passenger assigned
    OrderPassengerMissing = 4005,

    // ==================== 6xxx: Sync ====================
    /// Sync is not available (offline or backend unreachable)
    SyncUnavailable = 6001,
    /// A sync run was cancelled
    SyncCancelled = 6002,
    /// Order rejected by the backend during push
    SyncRejected = 6003,
    /// Backend response did not account for a pushed order
    SyncResponseIncomplete = 6004,
    /// Business rule rejected by the backend
    BusinessRuleViolation = 6005,

    // ==================== 7xxx: Conflict ====================
    /// Conflicting local and remote versions
    ConflictDetected = 7001,
    /// Resolution strategy needs human input
    ResolutionRequiresInput = 7002,
    /// Resolved order failed validation
    ResolutionInvalid = 7003,
    /// Local and remote snapshots refer to different orders
    ConflictIdMismatch = 7004,

    // ==================== 8xxx: Backend ====================
    /// Backend returned a server error
    BackendServerError = 8001,
    /// Backend rate limit exceeded
    RateLimited = 8002,
    /// Backend is unavailable
    BackendUnavailable = 8003,

    // ==================== 9xxx: System ====================
    /// Internal error
    InternalError = 9001,
    /// Local store error
    StorageError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timed out
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",

            // Auth
            ErrorCode::NotAuthenticated => "Backend session is not authenticated",
            ErrorCode::InvalidCredentials => "Backend rejected the credentials",
            ErrorCode::TokenExpired => "Authentication token has expired",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderEmpty => "Order has no items",
            ErrorCode::OrderTotalMismatch => "Order total does not match its items",
            ErrorCode::OrderItemInvalid => "Order item is invalid",
            ErrorCode::OrderPassengerMissing => "Order has no passenger",

            // Sync
            ErrorCode::SyncUnavailable => "Synchronization is not available",
            ErrorCode::SyncCancelled => "Synchronization was cancelled",
            ErrorCode::SyncRejected => "Order rejected by backend",
            ErrorCode::SyncResponseIncomplete => "Backend response did not include the order",
            ErrorCode::BusinessRuleViolation => "Business rule violation",

            // Conflict
            ErrorCode::ConflictDetected => "Local and remote versions conflict",
            ErrorCode::ResolutionRequiresInput => "Conflict requires manual resolution",
            ErrorCode::ResolutionInvalid => "Resolved order failed validation",
            ErrorCode::ConflictIdMismatch => "Orders must have the same id",

            // Backend
            ErrorCode::BackendServerError => "Backend server error",
            ErrorCode::RateLimited => "Backend rate limit exceeded",
            ErrorCode::BackendUnavailable => "Backend is unavailable",

            // System
            ErrorCode::InternalError => "Internal error",
            ErrorCode::StorageError => "Local store error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1003 => Ok(ErrorCode::TokenExpired),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderEmpty),
            4003 => Ok(ErrorCode::OrderTotalMismatch),
            4004 => Ok(ErrorCode::OrderItemInvalid),
            4005 => Ok(ErrorCode::OrderPassengerMissing),

            // Sync
            6001 => Ok(ErrorCode::SyncUnavailable),
            6002 => Ok(ErrorCode::SyncCancelled),
            6003 => Ok(ErrorCode::SyncRejected),
            6004 => Ok(ErrorCode::SyncResponseIncomplete),
            6005 => Ok(ErrorCode::BusinessRuleViolation),

            // Conflict
            7001 => Ok(ErrorCode::ConflictDetected),
            7002 => Ok(ErrorCode::ResolutionRequiresInput),
            7003 => Ok(ErrorCode::ResolutionInvalid),
            7004 => Ok(ErrorCode::ConflictIdMismatch),

            // Backend
            8001 => Ok(ErrorCode::BackendServerError),
            8002 => Ok(ErrorCode::RateLimited),
            8003 => Ok(ErrorCode::BackendUnavailable),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::StorageError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::OrderNotFound.code(), 4001);
        assert_eq!(ErrorCode::SyncUnavailable.code(), 6001);
        assert_eq!(ErrorCode::ConflictDetected.code(), 7001);
        assert_eq!(ErrorCode::RateLimited.code(), 8002);
        assert_eq!(ErrorCode::TimeoutError.code(), 9004);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::Unknown.is_success());
        assert!(!ErrorCode::SyncRejected.is_success());
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&ErrorCode::RateLimited).unwrap();
        assert_eq!(json, "8002");

        let json = serde_json::to_string(&ErrorCode::Success).unwrap();
        assert_eq!(json, "0");
    }

    #[test]
    fn test_deserialize() {
        let code: ErrorCode = serde_json::from_str("7002").unwrap();
        assert_eq!(code, ErrorCode::ResolutionRequiresInput);

        let code: ErrorCode = serde_json::from_str("9004").unwrap();
        assert_eq!(code, ErrorCode::TimeoutError);
    }

    #[test]
    fn test_deserialize_invalid() {
        let result: Result<ErrorCode, _> = serde_json::from_str("999");
        assert!(result.is_err());

        let result: Result<ErrorCode, _> = serde_json::from_str("10000");
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::Success), "0");
        assert_eq!(format!("{}", ErrorCode::OrderNotFound), "4001");
        assert_eq!(format!("{}", ErrorCode::ConflictIdMismatch), "7004");
    }

    #[test]
    fn test_message() {
        assert_eq!(ErrorCode::OrderNotFound.message(), "Order not found");
        assert_eq!(
            ErrorCode::ResolutionRequiresInput.message(),
            "Conflict requires manual resolution"
        );
    }

    #[test]
    fn test_invalid_error_code_display() {
        let err = InvalidErrorCode(999);
        assert_eq!(format!("{}", err), "invalid error code: 999");
    }
}
