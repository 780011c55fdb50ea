//! # Delivery engine
//!
//! Runs every payload through validation, the consent gate, duplicate suppression,
//! pacing and enrichment before handing it to the [`RetryExecutor`].
//!
//! The engine is built once from an [`EngineSettings`] snapshot and shared by reference.
//! Sends made through one engine are sequential per caller: every wait suspends the
//! calling task, and batches await each item before starting the next.
use std::sync::Arc;

use chrono::Utc;
use relay_common::consent::{AllowAll, ConsentDecision, ConsentGate};
use relay_common::delivery::{BatchResult, DeliveryResult, SendOptions};
use relay_common::health::{
    DeliveryMetrics, HealthReport, HealthStatus, MetricsSnapshot, DELIVERY_DURATION_SECONDS,
};
use relay_common::idempotency::IdempotencyStore;
use relay_common::limiter::RateLimiter;
use relay_common::payload::{Enricher, Payload};
use relay_common::router::CoverageReport;
use relay_common::store::{DurableStore, InMemoryStore, RedisStore};
use relay_common::validation::PayloadValidator;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{Config, EngineSettings};
use crate::error::{DeliveryError, EngineError};
use crate::executor::RetryExecutor;
use crate::transport::{build_http_client, HttpTransport, WebhookTransport};

pub const CONNECTIVITY_TEST_EVENT: &str = "system_test";

pub struct DeliveryEngine {
    settings: EngineSettings,
    validator: PayloadValidator,
    consent: Arc<dyn ConsentGate>,
    idempotency: IdempotencyStore,
    limiter: RateLimiter,
    enricher: Enricher,
    executor: RetryExecutor,
    metrics: Arc<DeliveryMetrics>,
}

impl DeliveryEngine {
    pub fn new(
        settings: EngineSettings,
        transport: Arc<dyn WebhookTransport>,
        store: Arc<dyn DurableStore>,
        consent: Arc<dyn ConsentGate>,
    ) -> Self {
        let metrics = Arc::new(DeliveryMetrics::new());

        Self {
            validator: PayloadValidator::new(settings.event_types.clone()),
            consent,
            idempotency: IdempotencyStore::new(settings.idempotency.clone(), store),
            limiter: RateLimiter::new(settings.rate_limit_interval),
            enricher: Enricher::new(settings.system.clone(), settings.club.clone()),
            executor: RetryExecutor::new(transport, metrics.clone()),
            metrics,
            settings,
        }
    }

    /// Build an engine with the HTTP transport, a Redis store when `REDIS_URL` is set and
    /// no consent gate.
    pub async fn from_config(config: &Config) -> Result<Self, EngineError> {
        let client = build_http_client(config.request_timeout.0, &config.user_agent)?;

        let store: Arc<dyn DurableStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisStore::new(url.0.clone()).await?),
            None => {
                info!("REDIS_URL is not set, idempotency records are kept in this process only");
                Arc::new(InMemoryStore::new())
            }
        };

        Ok(Self::new(
            config.engine_settings(),
            Arc::new(HttpTransport::new(client)),
            store,
            Arc::new(AllowAll),
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Deliver a single payload. Every outcome, failures included, is a `DeliveryResult`.
    pub async fn send_one(&self, payload: &Payload, options: &SendOptions) -> DeliveryResult {
        let start = Instant::now();

        let report = self.validator.validate(payload);
        if !report.valid {
            let error = DeliveryError::Validation(report.summary());
            warn!(event_type = payload.event_type(), error = %error, "rejecting payload");
            return self.finish(error.into_result(0), start);
        }

        let Some(url) = self.settings.webhook_url.as_deref() else {
            let error = DeliveryError::MissingWebhookUrl;
            warn!(event_type = payload.event_type(), error = %error, "cannot send payload");
            return self.finish(error.into_result(0), start);
        };

        if let ConsentDecision::Deny(reason) = self.consent.check(payload) {
            info!(event_type = payload.event_type(), reason = %reason, "send vetoed by consent check");
            return DeliveryError::ConsentDenied(reason).into_result(0);
        }

        let key = self.idempotency.resolve_key(payload, options);
        if let Some(key) = &key {
            if self.idempotency.is_duplicate(key).await {
                info!(event_type = payload.event_type(), key = %key, "skipping duplicate payload");
                self.metrics.record_duplicate();
                return DeliveryResult::duplicate(key.clone());
            }
        }

        if !options.skip_rate_limit {
            self.limiter.throttle().await;
        }

        let enriched = self.enricher.enrich(payload, &self.settings.router);
        let policy = self.settings.retry_policy.with_overrides(options);
        let result = self.executor.send(url, &enriched, &policy).await;

        if result.success {
            if let Some(key) = &key {
                self.idempotency.mark_processed(key).await;
            }
        }

        self.finish(result.with_idempotency_key(key), start)
    }

    /// Deliver payloads in chunks of `batch_size`, one interval apart. Items inside a chunk
    /// are not paced. A failed item never stops the ones after it.
    pub async fn send_batch(&self, payloads: &[Payload], options: &SendOptions) -> BatchResult {
        let item_options = options.skip_rate_limit();
        let mut results = Vec::with_capacity(payloads.len());

        for (index, chunk) in payloads.chunks(self.settings.batch_size.max(1)).enumerate() {
            if index > 0 {
                self.limiter.pause().await;
            }

            for payload in chunk {
                results.push(self.send_one(payload, &item_options).await);
            }
        }

        let batch = BatchResult::from_results(results);
        info!(
            success_count = batch.success_count,
            total_count = batch.total_count,
            "batch dispatched"
        );
        batch
    }

    /// Send a synthetic event through the whole pipeline. Never suppressed as a duplicate.
    pub async fn test_connectivity(&self) -> DeliveryResult {
        let payload = Payload::event(CONNECTIVITY_TEST_EVENT, Utc::now())
            .with_field("test", true)
            .with_field("message", "connectivity test")
            .with_field("session_id", self.enricher.session_id());
        let options = SendOptions {
            skip_idempotency: true,
            ..Default::default()
        };

        self.send_one(&payload, &options).await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn validate_routes(&self) -> CoverageReport {
        self.settings
            .router
            .validate_coverage(self.validator.event_types())
    }

    pub async fn health(&self) -> HealthReport {
        let metrics = self.metrics.snapshot();

        HealthReport {
            status: HealthStatus::from_success_rate(metrics.success_rate),
            metrics,
            rate_limiter: self.limiter.state().await,
            router: self.validate_routes(),
        }
    }

    /// Duplicates and consent vetoes return early and are not counted here.
    fn finish(&self, result: DeliveryResult, start: Instant) -> DeliveryResult {
        self.metrics.record_outcome(result.success);
        metrics::histogram!(DELIVERY_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        result
    }
}
