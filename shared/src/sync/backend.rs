//! Backend system-of-record types
//!
//! The engine only sees these shapes; how they travel over the wire is up to
//! the `BackendClient` implementation.

use crate::error::{AppError, ErrorCode};
use crate::order::OrderSnapshot;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Response
// ============================================================================

/// Per-order error reported inside a backend response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl BackendError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            order_id: None,
            field: None,
        }
    }

    pub fn for_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn to_app_error(&self) -> AppError {
        let mut err = AppError::with_message(self.code, self.message.clone());
        if let Some(field) = &self.field {
            err = err.with_detail("field", field.clone());
        }
        err
    }
}

/// Uniform response for every backend call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendResponse {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub orders: Vec<OrderSnapshot>,
    #[serde(default)]
    pub errors: Vec<BackendError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl BackendResponse {
    pub fn success(message: impl Into<String>, orders: Vec<OrderSnapshot>) -> Self {
        Self {
            success: true,
            status_code: 200,
            message: message.into(),
            timestamp: Utc::now(),
            orders,
            errors: Vec::new(),
            request_id: Some(Uuid::new_v4().to_string()),
            response_time_ms: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(status_code: u16, message: impl Into<String>, errors: Vec<BackendError>) -> Self {
        Self {
            success: false,
            status_code,
            message: message.into(),
            timestamp: Utc::now(),
            orders: Vec::new(),
            errors,
            request_id: Some(Uuid::new_v4().to_string()),
            response_time_ms: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = ms;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_orders(&self) -> bool {
        !self.orders.is_empty()
    }

    pub fn order(&self, order_id: Uuid) -> Option<&OrderSnapshot> {
        self.orders.iter().find(|o| o.order_id == order_id)
    }

    /// Error reported for a specific order
    pub fn error_for(&self, order_id: Uuid) -> Option<&BackendError> {
        self.errors.iter().find(|e| e.order_id == Some(order_id))
    }

    /// Error not tied to any order (applies to the whole request)
    pub fn general_error(&self) -> Option<&BackendError> {
        self.errors.iter().find(|e| e.order_id.is_none())
    }

    /// External reference the backend assigned to a pushed order, if it reported one
    pub fn external_id_for(&self, order_id: Uuid) -> Option<String> {
        self.order(order_id)
            .and_then(|o| o.sync.external_id.clone())
    }
}

// ============================================================================
// Rate Limit
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimit {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub requests_per_day: u32,
    pub remaining_requests: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
    pub burst_limit: u32,
    pub retry_after_secs: u64,
}

impl RateLimit {
    pub fn unlimited() -> Self {
        Self {
            requests_per_minute: u32::MAX,
            requests_per_hour: u32::MAX,
            requests_per_day: u32::MAX,
            remaining_requests: u32::MAX,
            reset_time: None,
            burst_limit: u32::MAX,
            retry_after_secs: 0,
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            requests_per_minute: 0,
            requests_per_hour: 0,
            requests_per_day: 0,
            remaining_requests: 0,
            reset_time: Some(Utc::now() + Duration::seconds(retry_after_secs as i64)),
            burst_limit: 0,
            retry_after_secs,
        }
    }

    /// A fixed per-minute budget with the whole budget remaining
    pub fn per_minute(requests: u32, burst_limit: u32) -> Self {
        Self {
            requests_per_minute: requests,
            requests_per_hour: requests.saturating_mul(60),
            requests_per_day: requests.saturating_mul(60 * 24),
            remaining_requests: requests,
            reset_time: None,
            burst_limit,
            retry_after_secs: 0,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.remaining_requests == 0 || self.retry_after_secs > 0
    }

    pub fn can_make_request(&self) -> bool {
        self.remaining_requests > 0 && self.retry_after_secs == 0
    }

    pub fn can_make_batch_request(&self, batch_size: u32) -> bool {
        self.remaining_requests >= batch_size && self.retry_after_secs == 0
    }

    pub fn usage_percentage(&self) -> f64 {
        if self.requests_per_minute == 0 {
            return 0.0;
        }
        let used = self.requests_per_minute.saturating_sub(self.remaining_requests);
        used as f64 / self.requests_per_minute as f64 * 100.0
    }

    pub fn is_near_limit(&self, threshold_percent: f64) -> bool {
        self.usage_percentage() >= threshold_percent
    }

    /// Requests that may be in flight at once (at least 1 unless limited)
    pub fn concurrency_allowance(&self) -> usize {
        if !self.can_make_request() {
            return 0;
        }
        self.burst_limit.min(self.remaining_requests).max(1) as usize
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthLevel {
    Good,
    Degraded,
    Poor,
    Critical,
}

impl HealthLevel {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Degraded => "Degraded",
            Self::Poor => "Poor",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub level: HealthLevel,
    pub timestamp: DateTime<Utc>,
    /// None when the backend did not answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl HealthStatus {
    pub fn healthy(response_time_ms: u64, version: impl Into<String>) -> Self {
        Self {
            healthy: true,
            level: HealthLevel::Good,
            timestamp: Utc::now(),
            response_time_ms: Some(response_time_ms),
            version: Some(version.into()),
            details: HashMap::new(),
        }
    }

    pub fn degraded(response_time_ms: u64, version: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert("reason".to_string(), Value::String(reason.into()));
        Self {
            healthy: true,
            level: HealthLevel::Degraded,
            timestamp: Utc::now(),
            response_time_ms: Some(response_time_ms),
            version: Some(version.into()),
            details,
        }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert("reason".to_string(), Value::String(reason.into()));
        Self {
            healthy: false,
            level: HealthLevel::Critical,
            timestamp: Utc::now(),
            response_time_ms: None,
            version: None,
            details,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.details.get("reason").and_then(|v| v.as_str())
    }

    /// Under 5s
    pub fn is_response_time_acceptable(&self) -> bool {
        self.response_time_ms.is_some_and(|ms| ms < 5000)
    }

    /// Under 1s
    pub fn is_performance_good(&self) -> bool {
        self.response_time_ms.is_some_and(|ms| ms < 1000)
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<DateTime<Utc>>,
}

impl BackendCredentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn client(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Default::default()
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// A token without expiry never expires
    pub fn is_token_expired(&self) -> bool {
        match (&self.token, self.token_expiry) {
            (Some(_), Some(expiry)) => expiry <= Utc::now(),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.api_key.is_some() || (self.client_id.is_some() && self.client_secret.is_some())
    }
}

// Secrets stay out of logs
impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}
