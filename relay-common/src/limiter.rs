use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimiterState {
    pub min_interval_ms: u64,
    pub last_call_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LastCall {
    at: Option<Instant>,
    wall_clock: Option<DateTime<Utc>>,
}

/// Enforces a minimum spacing between outbound calls made by this process.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<LastCall>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(LastCall::default()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `min_interval` has passed since the previous call, then record this one.
    /// Each caller reserves its slot under the lock and sleeps without it, so concurrent
    /// callers are spaced in arrival order and `state` never waits behind them.
    pub async fn throttle(&self) {
        let slot = {
            let mut last_call = self.last_call.lock().await;
            let now = Instant::now();
            let slot = match last_call.at {
                Some(at) => (at + self.min_interval).max(now),
                None => now,
            };
            last_call.at = Some(slot);
            slot
        };

        tokio::time::sleep_until(slot).await;

        self.last_call.lock().await.wall_clock = Some(Utc::now());
    }

    /// Sleep for one interval without recording a call. Used to space out batch chunks.
    pub async fn pause(&self) {
        tokio::time::sleep(self.min_interval).await;
    }

    pub async fn state(&self) -> RateLimiterState {
        let last_call = self.last_call.lock().await;

        RateLimiterState {
            min_interval_ms: u64::try_from(self.min_interval.as_millis()).unwrap_or(u64::MAX),
            last_call_at: last_call.wall_clock,
        }
    }
}
