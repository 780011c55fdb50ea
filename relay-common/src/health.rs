//! # Health
//!
//! Process-lifetime delivery counters and the health signal derived from them.
//!
//! Counters are kept twice: in [`DeliveryMetrics`], for the `health()`/`metrics()`
//! diagnostics, and in the global `metrics` recorder, for Prometheus scraping.
use std::sync::{Mutex, PoisonError};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limiter::RateLimiterState;
use crate::router::CoverageReport;

pub const DELIVERIES_TOTAL: &str = "relay_deliveries_total";
pub const DELIVERY_ATTEMPTS_TOTAL: &str = "relay_delivery_attempts_total";
pub const DELIVERY_RETRIES_TOTAL: &str = "relay_delivery_retries_total";
pub const DUPLICATES_SKIPPED_TOTAL: &str = "relay_duplicates_skipped_total";
pub const DELIVERY_DURATION_SECONDS: &str = "relay_delivery_duration_seconds";

const HEALTHY_THRESHOLD: f64 = 95.0;
const DEGRADED_THRESHOLD: f64 = 80.0;

#[derive(Debug, Default)]
struct Counters {
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    retried_calls: u64,
    last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub retried_calls: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Percentage of successful calls, 100 when no call was made yet.
    pub success_rate: f64,
}

/// Outcome counters for the deliveries made by this process. Never persisted.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    counters: Mutex<Counters>,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, success: bool) {
        {
            let mut counters = self.lock();
            counters.total_calls += 1;
            if success {
                counters.successful_calls += 1;
                counters.last_success_at = Some(Utc::now());
            } else {
                counters.failed_calls += 1;
            }
        }

        let outcome = if success { "success" } else { "failure" };
        ::metrics::counter!(DELIVERIES_TOTAL, "outcome" => outcome).increment(1);
    }

    /// Count a delivery that needed more than one attempt.
    pub fn record_retried(&self) {
        self.lock().retried_calls += 1;
        ::metrics::counter!(DELIVERY_RETRIES_TOTAL).increment(1);
    }

    /// Duplicates make no delivery attempt, so they only show up in Prometheus.
    pub fn record_duplicate(&self) {
        ::metrics::counter!(DUPLICATES_SKIPPED_TOTAL).increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.lock();

        let success_rate = if counters.total_calls == 0 {
            100.0
        } else {
            counters.successful_calls as f64 / counters.total_calls as f64 * 100.0
        };

        MetricsSnapshot {
            total_calls: counters.total_calls,
            successful_calls: counters.successful_calls,
            failed_calls: counters.failed_calls,
            retried_calls: counters.retried_calls,
            last_success_at: counters.last_success_at,
            success_rate,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_success_rate(success_rate: f64) -> Self {
        if success_rate >= HEALTHY_THRESHOLD {
            HealthStatus::Healthy
        } else if success_rate >= DEGRADED_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub metrics: MetricsSnapshot,
    pub rate_limiter: RateLimiterState,
    pub router: CoverageReport,
}

impl IntoResponse for HealthReport {
    /// A degraded relay still delivers most payloads, so only `unhealthy` fails the probe.
    fn into_response(self) -> Response {
        let status = match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}
