//! Retry with exponential backoff for backend calls
//!
//! Each attempt runs under the request timeout; an elapsed timeout becomes a
//! retryable timeout error. Rate-limit errors are returned at once with their
//! backoff hint instead of being retried inside the run. Every sleep races the
//! run's cancellation token.

use std::future::Future;
use std::time::Duration;

use shared::error::AppResult;
use shared::sync::{SyncError, SyncErrorType};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Why a retried call gave up
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailure {
    Cancelled,
    Failed(SyncError),
}

/// Parameters shared by every call of one run
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub policy: &'a RetryPolicy,
    pub timeout: Duration,
    pub rate_limit_backoff_secs: u64,
    pub cancel: &'a CancellationToken,
}

/// Run `call` until it succeeds, fails permanently, or retries run out
///
/// `on_retry(attempt, error)` fires before each retry sleep.
pub async fn call_with_retry<T, F, Fut>(
    ctx: CallContext<'_>,
    order_id: Option<Uuid>,
    mut on_retry: impl FnMut(u32, &SyncError),
    mut call: F,
) -> Result<T, CallFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        if ctx.cancel.is_cancelled() {
            return Err(CallFailure::Cancelled);
        }

        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(CallFailure::Cancelled),
            res = tokio::time::timeout(ctx.timeout, call()) => res,
        };

        let error = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => SyncError::from_app_error(order_id, &e, ctx.rate_limit_backoff_secs),
            Err(_) => timeout_error(order_id, ctx.timeout),
        };

        let exhausted = attempt >= ctx.policy.max_retries;
        if !error.retryable || error.error_type == SyncErrorType::RateLimit || exhausted {
            return Err(CallFailure::Failed(error));
        }

        attempt += 1;
        let delay = ctx.policy.delay_for(attempt);
        tracing::warn!(
            order_id = ?order_id,
            attempt,
            max_retries = ctx.policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Backend call failed, retrying"
        );
        on_retry(attempt, &error);

        if !delay.is_zero() {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(CallFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn timeout_error(order_id: Option<Uuid>, timeout: Duration) -> SyncError {
    SyncError::new(
        order_id,
        SyncErrorType::Timeout,
        format!("Backend did not answer within {}ms", timeout.as_millis()),
    )
}
