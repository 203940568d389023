//! Per-order sync failures

use crate::error::{AppError, ErrorCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default backoff for rate-limit errors when the backend gives no hint
pub const DEFAULT_RATE_LIMIT_BACKOFF_SECS: u64 = 300;

/// Sync error taxonomy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SyncErrorType {
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "CONFLICT_ERROR")]
    Conflict,
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    #[serde(rename = "SERVER_ERROR")]
    Server,
    #[serde(rename = "DATA_ERROR")]
    Data,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimit,
    #[serde(rename = "BUSINESS_RULE_ERROR")]
    BusinessRule,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl SyncErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Conflict => "CONFLICT_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Server => "SERVER_ERROR",
            Self::Data => "DATA_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::RateLimit => "RATE_LIMIT_ERROR",
            Self::BusinessRule => "BUSINESS_RULE_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Network => "Network Error",
            Self::Validation => "Validation Error",
            Self::Conflict => "Conflict Error",
            Self::Authentication => "Authentication Error",
            Self::Server => "Server Error",
            Self::Data => "Data Error",
            Self::Timeout => "Timeout Error",
            Self::RateLimit => "Rate Limit Error",
            Self::BusinessRule => "Business Rule Error",
            Self::Unknown => "Unknown Error",
        }
    }

    pub fn is_default_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Server | Self::Timeout | Self::RateLimit | Self::Unknown
        )
    }

    pub fn requires_user_intervention(&self) -> bool {
        matches!(
            self,
            Self::Conflict | Self::Authentication | Self::BusinessRule | Self::Data
        )
    }

    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server
        )
    }

    pub fn recommended_retry_delay(&self) -> Duration {
        match self {
            Self::Network | Self::Timeout => Duration::from_secs(30),
            Self::Server => Duration::from_secs(60),
            Self::RateLimit => Duration::from_secs(DEFAULT_RATE_LIMIT_BACKOFF_SECS),
            _ => Duration::ZERO,
        }
    }

    /// Short error code recorded on the error, e.g. `TIMEOUT_001`
    pub fn short_code(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK_001",
            Self::Validation => "VALIDATION_001",
            Self::Conflict => "CONFLICT_001",
            Self::Authentication => "AUTH_001",
            Self::Server => "SERVER_001",
            Self::Data => "DATA_001",
            Self::Timeout => "TIMEOUT_001",
            Self::RateLimit => "RATE_LIMIT_001",
            Self::BusinessRule => "BUSINESS_001",
            Self::Unknown => "UNKNOWN_001",
        }
    }

    /// Numeric code used when no collaborator error is available
    pub fn default_error_code(&self) -> ErrorCode {
        match self {
            Self::Network => ErrorCode::NetworkError,
            Self::Validation => ErrorCode::ValidationFailed,
            Self::Conflict => ErrorCode::ConflictDetected,
            Self::Authentication => ErrorCode::NotAuthenticated,
            Self::Server => ErrorCode::BackendServerError,
            Self::Data => ErrorCode::StorageError,
            Self::Timeout => ErrorCode::TimeoutError,
            Self::RateLimit => ErrorCode::RateLimited,
            Self::BusinessRule => ErrorCode::BusinessRuleViolation,
            Self::Unknown => ErrorCode::Unknown,
        }
    }

    /// Classify a numeric error code into the sync taxonomy
    pub fn classify(code: ErrorCode) -> Self {
        match code {
            ErrorCode::NetworkError | ErrorCode::BackendUnavailable | ErrorCode::SyncUnavailable => {
                Self::Network
            }
            ErrorCode::TimeoutError => Self::Timeout,
            ErrorCode::RateLimited => Self::RateLimit,
            ErrorCode::BackendServerError | ErrorCode::InternalError => Self::Server,
            ErrorCode::NotAuthenticated
            | ErrorCode::InvalidCredentials
            | ErrorCode::TokenExpired => Self::Authentication,
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidRequest
            | ErrorCode::OrderEmpty
            | ErrorCode::OrderTotalMismatch
            | ErrorCode::OrderItemInvalid
            | ErrorCode::OrderPassengerMissing => Self::Validation,
            ErrorCode::SyncRejected | ErrorCode::BusinessRuleViolation => Self::BusinessRule,
            ErrorCode::ConflictDetected
            | ErrorCode::ResolutionRequiresInput
            | ErrorCode::ResolutionInvalid
            | ErrorCode::ConflictIdMismatch => Self::Conflict,
            ErrorCode::NotFound
            | ErrorCode::OrderNotFound
            | ErrorCode::AlreadyExists
            | ErrorCode::SyncResponseIncomplete => Self::Data,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SyncErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed per-order operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncError {
    /// None for run-level failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    pub error_type: SyncErrorType,
    /// Short code such as `TIMEOUT_001`
    pub error_code: String,
    /// Numeric code of the underlying failure
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub retryable: bool,
    /// Backoff the next run should honour before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SyncError {
    pub fn new(order_id: Option<Uuid>, error_type: SyncErrorType, message: impl Into<String>) -> Self {
        Self {
            order_id,
            error_type,
            error_code: error_type.short_code().to_string(),
            code: error_type.default_error_code(),
            message: message.into(),
            details: None,
            retryable: error_type.is_default_retryable(),
            retry_after_secs: None,
            cause: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn network(order_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(Some(order_id), SyncErrorType::Network, message)
    }

    pub fn validation(order_id: Uuid, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(Some(order_id), SyncErrorType::Validation, message).with_details(details)
    }

    pub fn conflict(order_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(Some(order_id), SyncErrorType::Conflict, message)
    }

    pub fn authentication(order_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self::new(order_id, SyncErrorType::Authentication, message)
    }

    pub fn server(order_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(Some(order_id), SyncErrorType::Server, message)
    }

    pub fn data(order_id: Uuid, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(Some(order_id), SyncErrorType::Data, message).with_details(details)
    }

    pub fn timeout(order_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(Some(order_id), SyncErrorType::Timeout, message)
    }

    pub fn rate_limited(order_id: Option<Uuid>, retry_after_secs: u64) -> Self {
        let mut err = Self::new(
            order_id,
            SyncErrorType::RateLimit,
            format!("Backend rate limit exceeded, retry after {}s", retry_after_secs),
        );
        err.retry_after_secs = Some(retry_after_secs);
        err
    }

    /// Classify a collaborator error
    ///
    /// Rate-limit errors take their backoff from the `retry_after_secs` detail,
    /// falling back to `default_backoff_secs`.
    pub fn from_app_error(order_id: Option<Uuid>, err: &AppError, default_backoff_secs: u64) -> Self {
        let error_type = SyncErrorType::classify(err.code);
        let mut sync_err = Self::new(order_id, error_type, err.message.clone());
        sync_err.code = err.code;
        if let Some(details) = &err.details {
            sync_err.details = serde_json::to_string(details).ok();
        }
        if error_type == SyncErrorType::RateLimit {
            let secs = err
                .detail("retry_after_secs")
                .and_then(|v| v.as_u64())
                .unwrap_or(default_backoff_secs);
            sync_err.retry_after_secs = Some(secs);
        }
        sync_err
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_secs.map(Duration::from_secs)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order_id {
            Some(id) => write!(f, "[{}] order {}: {}", self.error_code, id, self.message),
            None => write!(f, "[{}] {}", self.error_code, self.message),
        }
    }
}

impl std::error::Error for SyncError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retryability() {
        use SyncErrorType::*;
        for t in [Network, Server, Timeout, RateLimit, Unknown] {
            assert!(t.is_default_retryable(), "{t} should be retryable");
        }
        for t in [Validation, Conflict, Authentication, Data, BusinessRule] {
            assert!(!t.is_default_retryable(), "{t} should not be retryable");
        }
    }

    #[test]
    fn test_user_intervention_and_delays() {
        assert!(SyncErrorType::Authentication.requires_user_intervention());
        assert!(!SyncErrorType::Network.requires_user_intervention());
        assert!(SyncErrorType::Timeout.is_temporary());
        assert_eq!(
            SyncErrorType::Network.recommended_retry_delay(),
            Duration::from_secs(30)
        );
        assert_eq!(
            SyncErrorType::Server.recommended_retry_delay(),
            Duration::from_secs(60)
        );
        assert_eq!(
            SyncErrorType::RateLimit.recommended_retry_delay(),
            Duration::from_secs(300)
        );
        assert_eq!(SyncErrorType::Data.recommended_retry_delay(), Duration::ZERO);
    }

    #[test]
    fn test_factories() {
        let id = Uuid::new_v4();
        let err = SyncError::timeout(id, "push timed out");
        assert_eq!(err.error_type, SyncErrorType::Timeout);
        assert_eq!(err.error_code, "TIMEOUT_001");
        assert!(err.retryable);

        let err = SyncError::validation(id, "bad order", "no items");
        assert!(!err.retryable);
        assert_eq!(err.details.as_deref(), Some("no items"));

        let err = SyncError::rate_limited(Some(id), 120);
        assert!(err.retryable);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_from_app_error_rate_limit() {
        let id = Uuid::new_v4();
        let err = SyncError::from_app_error(Some(id), &AppError::rate_limited(90), 300);
        assert_eq!(err.error_type, SyncErrorType::RateLimit);
        assert_eq!(err.retry_after_secs, Some(90));

        let bare = AppError::new(ErrorCode::RateLimited);
        let err = SyncError::from_app_error(Some(id), &bare, 300);
        assert_eq!(err.retry_after_secs, Some(300));
        assert!(err.retryable);
    }

    #[test]
    fn test_from_app_error_classification() {
        let cases = [
            (AppError::timeout("slow"), SyncErrorType::Timeout),
            (AppError::network("down"), SyncErrorType::Network),
            (AppError::not_authenticated(), SyncErrorType::Authentication),
            (AppError::validation("bad"), SyncErrorType::Validation),
            (
                AppError::new(ErrorCode::SyncRejected),
                SyncErrorType::BusinessRule,
            ),
            (
                AppError::new(ErrorCode::BackendServerError),
                SyncErrorType::Server,
            ),
            (AppError::storage("disk"), SyncErrorType::Unknown),
        ];
        for (app, expected) in cases {
            let err = SyncError::from_app_error(None, &app, 300);
            assert_eq!(err.error_type, expected, "{}", app);
            assert_eq!(err.code, app.code);
        }
    }

    #[test]
    fn test_serialize_error_type() {
        let json = serde_json::to_string(&SyncErrorType::RateLimit).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_ERROR\"");
    }
}
