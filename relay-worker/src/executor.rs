use std::sync::Arc;

use relay_common::delivery::DeliveryResult;
use relay_common::health::{DeliveryMetrics, DELIVERY_ATTEMPTS_TOTAL};
use relay_common::payload::EnrichedPayload;
use relay_common::retry::{classify_status, ResponseClass, RetryCause, RetryPolicy};
use tracing::{error, info, warn};

use crate::error::DeliveryError;
use crate::transport::{WebhookRequest, WebhookTransport};

/// POSTs an enriched payload, retrying rate limits, server errors and network failures.
///
/// Backoff sleeps suspend the calling task, so a send occupies its caller until it has
/// either delivered or used up every attempt.
pub struct RetryExecutor {
    transport: Arc<dyn WebhookTransport>,
    metrics: Arc<DeliveryMetrics>,
}

impl RetryExecutor {
    pub fn new(transport: Arc<dyn WebhookTransport>, metrics: Arc<DeliveryMetrics>) -> Self {
        Self { transport, metrics }
    }

    pub async fn send(
        &self,
        url: &str,
        payload: &EnrichedPayload,
        policy: &RetryPolicy,
    ) -> DeliveryResult {
        let event_type = payload.event_type();
        let body = match payload.to_body() {
            Ok(body) => body,
            Err(e) => return DeliveryError::Serialization(e).into_result(0),
        };
        let max_attempts = policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            metrics::counter!(DELIVERY_ATTEMPTS_TOTAL, "event_type" => event_type.to_owned())
                .increment(1);

            let request = WebhookRequest {
                url: url.to_owned(),
                body: body.clone(),
                attempt,
                event_type: event_type.to_owned(),
            };

            let (error, cause) = match self.transport.post(request).await {
                Ok(response) => match classify_status(response.status) {
                    ResponseClass::Success => {
                        if attempt > 1 {
                            self.metrics.record_retried();
                        }
                        info!(
                            event_type,
                            attempt,
                            status = response.status.as_u16(),
                            "webhook delivered"
                        );
                        return DeliveryResult::delivered(response.status.as_u16(), attempt);
                    }
                    ResponseClass::RateLimited => (
                        DeliveryError::RateLimited {
                            body: response.body,
                        },
                        RetryCause::RateLimited,
                    ),
                    ResponseClass::ServerError => (
                        DeliveryError::ServerError {
                            status: response.status,
                            body: response.body,
                        },
                        RetryCause::ServerError,
                    ),
                    ResponseClass::Rejected => {
                        let rejected = DeliveryError::Rejected {
                            status: response.status,
                            body: response.body,
                        };
                        error!(event_type, attempt, error = %rejected, "webhook rejected");
                        return rejected.into_result(attempt);
                    }
                },
                Err(e) if e.is_retryable() => (DeliveryError::Transport(e), RetryCause::Network),
                Err(e) => {
                    let terminal = DeliveryError::Transport(e);
                    error!(event_type, attempt, error = %terminal, "webhook request failed");
                    return terminal.into_result(attempt);
                }
            };

            if attempt >= max_attempts {
                error!(
                    event_type,
                    attempts = attempt,
                    error = %error,
                    "webhook delivery failed after exhausting retries"
                );
                return error.into_result(attempt);
            }

            let interval = policy.retry_interval(attempt, cause);
            warn!(
                event_type,
                attempt,
                error = %error,
                retry_in = ?interval,
                "webhook delivery failed, retrying"
            );
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_common::delivery::Reason;
    use relay_common::payload::{ClubInfo, Enricher, Payload, SystemInfo};
    use relay_common::router::RouterTable;
    use tokio::time::Instant;

    use super::*;
    use crate::error::TransportError;
    use crate::test_utils::MockTransport;

    const RETRY_DELAY: Duration = Duration::from_millis(1000);

    fn enriched() -> EnrichedPayload {
        let enricher = Enricher::new(
            SystemInfo {
                version: "1.0.0".to_owned(),
                environment: "test".to_owned(),
            },
            ClubInfo {
                name: "Town Tigers FC".to_owned(),
                short_name: "Tigers".to_owned(),
                season: "2025/26".to_owned(),
            },
        );
        let payload = Payload::new()
            .with_field("event_type", "goal_team")
            .with_field("timestamp", "2025-01-01T12:00:00Z");

        enricher.enrich(&payload, &RouterTable::club_defaults())
    }

    fn executor(transport: Arc<MockTransport>) -> (RetryExecutor, Arc<DeliveryMetrics>) {
        let metrics = Arc::new(DeliveryMetrics::new());
        (RetryExecutor::new(transport, metrics.clone()), metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let transport = Arc::new(MockTransport::with_statuses(&[200]));
        let (executor, metrics) = executor(transport.clone());

        let result = executor
            .send("https://hook.test", &enriched(), &RetryPolicy::new(3, RETRY_DELAY))
            .await;

        assert_eq!(result, DeliveryResult::delivered(200, 1));
        assert_eq!(metrics.snapshot().retried_calls, 0);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].attempt, 1);
        assert_eq!(requests[0].event_type, "goal_team");
        assert_eq!(requests[0].url, "https://hook.test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let transport = Arc::new(MockTransport::with_statuses(&[429, 429, 200]));
        let (executor, metrics) = executor(transport.clone());
        let start = Instant::now();

        let result = executor
            .send("https://hook.test", &enriched(), &RetryPolicy::new(3, RETRY_DELAY))
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert!(start.elapsed() >= RETRY_DELAY * 2 + RETRY_DELAY * 4);
        assert_eq!(metrics.snapshot().retried_calls, 1);

        let attempts: Vec<u32> = transport.requests().iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_back_off_linearly() {
        let transport = Arc::new(MockTransport::with_statuses(&[500, 503, 200]));
        let (executor, _) = executor(transport);
        let start = Instant::now();

        let result = executor
            .send("https://hook.test", &enriched(), &RetryPolicy::new(3, RETRY_DELAY))
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(start.elapsed(), RETRY_DELAY + RETRY_DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_terminal() {
        let transport = Arc::new(MockTransport::with_statuses(&[404]));
        let (executor, _) = executor(transport.clone());
        let start = Instant::now();

        let result = executor
            .send("https://hook.test", &enriched(), &RetryPolicy::new(3, RETRY_DELAY))
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.response_code, Some(404));
        assert_eq!(result.reason, Some(Reason::TerminalTransportError));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_does_not_sleep_after_last_attempt() {
        let transport = Arc::new(MockTransport::with_statuses(&[502, 502, 502]));
        let (executor, _) = executor(transport.clone());
        let start = Instant::now();

        let result = executor
            .send("https://hook.test", &enriched(), &RetryPolicy::new(3, RETRY_DELAY))
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.reason, Some(Reason::RetriesExhausted));
        assert_eq!(result.response_code, Some(502));
        assert_eq!(start.elapsed(), RETRY_DELAY + RETRY_DELAY * 2);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error(TransportError::Connection("connection reset".to_owned()));
        transport.push_status(200);
        let (executor, _) = executor(transport);

        let result = executor
            .send("https://hook.test", &enriched(), &RetryPolicy::new(3, RETRY_DELAY))
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_is_not_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error(TransportError::Request("relative URL without a base".to_owned()));
        let (executor, _) = executor(transport.clone());

        let result = executor
            .send("hook.test", &enriched(), &RetryPolicy::new(3, RETRY_DELAY))
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.reason, Some(Reason::TerminalTransportError));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_still_attempts_once() {
        let transport = Arc::new(MockTransport::with_statuses(&[500]));
        let (executor, _) = executor(transport.clone());

        let result = executor
            .send("https://hook.test", &enriched(), &RetryPolicy::new(0, RETRY_DELAY))
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(transport.requests().len(), 1);
    }
}
