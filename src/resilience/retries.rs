//! Retry logic.
//!
//! # Responsibilities
//! - Classify an attempt's result as final or retryable
//! - Carry the attempt budget and backoff parameters
//!
//! # Design Decisions
//! - Connection/timeout errors always retryable
//! - 5xx retryable; 2xx–4xx are final and returned as-is
//! - Admin PATCHes replace a whole route, so repeating one is safe

use reqwest::StatusCode;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::resilience::backoff::calculate_backoff;

/// Whether an attempt that ended with `status` (or a transport error) should be retried.
pub fn is_retryable(status: Option<StatusCode>, transport_error: bool) -> bool {
    if transport_error {
        return true;
    }
    status.map(|s| s.is_server_error()).unwrap_or(false)
}

/// Attempt budget and backoff parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_retryable(None, true));
        assert!(is_retryable(Some(StatusCode::INTERNAL_SERVER_ERROR), false));
        assert!(is_retryable(Some(StatusCode::BAD_GATEWAY), false));
        assert!(!is_retryable(Some(StatusCode::OK), false));
        assert!(!is_retryable(Some(StatusCode::NOT_FOUND), false));
        assert!(!is_retryable(Some(StatusCode::TOO_MANY_REQUESTS), false));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(1).as_millis(), 200);
    }
}
