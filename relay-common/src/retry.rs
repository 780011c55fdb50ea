//! # Retry
//!
//! Response classification and backoff intervals for webhook deliveries.
use std::time;

use http::StatusCode;

use crate::delivery::SendOptions;

/// How a response status is handled by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// 429: retried with doubled backoff.
    RateLimited,
    /// 5xx: retried with linear backoff.
    ServerError,
    /// Every other status. Not retried.
    Rejected,
}

pub fn classify_status(status: StatusCode) -> ResponseClass {
    if status.is_success() {
        ResponseClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ResponseClass::RateLimited
    } else if status.is_server_error() {
        ResponseClass::ServerError
    } else {
        ResponseClass::Rejected
    }
}

/// Return `true` if the given `StatusCode` is considered to be retryable.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        classify_status(status),
        ResponseClass::RateLimited | ResponseClass::ServerError
    )
}

/// What caused a retry, which decides how long to back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    RateLimited,
    ServerError,
    Network,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A retry policy to determine how many attempts a delivery gets and how long to wait between them.
pub struct RetryPolicy {
    /// Total attempts per send, the first one included.
    pub max_retries: u32,
    /// Base interval, multiplied by the attempt number.
    pub retry_delay: time::Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: time::Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Apply the per-call overrides in `options`.
    pub fn with_overrides(&self, options: &SendOptions) -> Self {
        Self {
            max_retries: options.max_retries.unwrap_or(self.max_retries),
            retry_delay: options
                .retry_delay_ms
                .map(time::Duration::from_millis)
                .unwrap_or(self.retry_delay),
        }
    }

    /// A send always makes at least one attempt, even with `max_retries` set to 0.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Determine the interval to wait after a failed `attempt` (1-based).
    pub fn retry_interval(&self, attempt: u32, cause: RetryCause) -> time::Duration {
        let linear = self.retry_delay.saturating_mul(attempt);

        match cause {
            RetryCause::RateLimited => linear.saturating_mul(2),
            RetryCause::ServerError | RetryCause::Network => linear,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, time::Duration::from_millis(2000))
    }
}
