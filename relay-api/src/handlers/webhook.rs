use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use relay_common::delivery::{BatchResult, DeliveryResult, Reason, SendOptions};
use relay_common::health::{HealthReport, MetricsSnapshot};
use relay_common::payload::Payload;
use relay_worker::engine::DeliveryEngine;
use serde::Deserialize;
use tracing::debug;

/// The body of a request to deliver a single payload.
#[derive(Deserialize, Debug)]
pub struct WebhookPostRequestBody {
    payload: Payload,
    #[serde(default)]
    options: SendOptions,
}

/// The body of a request to deliver several payloads as one batch.
#[derive(Deserialize, Debug)]
pub struct BatchPostRequestBody {
    payloads: Vec<Payload>,
    #[serde(default)]
    options: SendOptions,
}

pub async fn post_webhook(
    State(engine): State<Arc<DeliveryEngine>>,
    Json(body): Json<WebhookPostRequestBody>,
) -> (StatusCode, Json<DeliveryResult>) {
    debug!("received payload: {:?}", body.payload);

    let result = engine.send_one(&body.payload, &body.options).await;

    (status_for(&result), Json(result))
}

pub async fn post_batch(
    State(engine): State<Arc<DeliveryEngine>>,
    Json(body): Json<BatchPostRequestBody>,
) -> Json<BatchResult> {
    debug!("received batch of {} payloads", body.payloads.len());

    Json(engine.send_batch(&body.payloads, &body.options).await)
}

pub async fn post_test(
    State(engine): State<Arc<DeliveryEngine>>,
) -> (StatusCode, Json<DeliveryResult>) {
    let result = engine.test_connectivity().await;

    (status_for(&result), Json(result))
}

pub async fn get_health(State(engine): State<Arc<DeliveryEngine>>) -> HealthReport {
    engine.health().await
}

pub async fn get_stats(State(engine): State<Arc<DeliveryEngine>>) -> Json<MetricsSnapshot> {
    Json(engine.metrics())
}

/// Skipped duplicates are successes. Every failure that made it to the endpoint is a 502.
fn status_for(result: &DeliveryResult) -> StatusCode {
    if result.success {
        return StatusCode::OK;
    }

    match result.reason {
        Some(Reason::ValidationError) => StatusCode::BAD_REQUEST,
        Some(Reason::ConsentDenied) => StatusCode::FORBIDDEN,
        Some(Reason::ConfigurationError) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for(&DeliveryResult::delivered(200, 1)),
            StatusCode::OK
        );
        assert_eq!(
            status_for(&DeliveryResult::duplicate("key".to_owned())),
            StatusCode::OK
        );

        let failed = |reason| DeliveryResult::failed(reason, "failed".to_owned(), 0);
        assert_eq!(
            status_for(&failed(Reason::ValidationError)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&failed(Reason::ConsentDenied)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&failed(Reason::ConfigurationError)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&failed(Reason::RetriesExhausted)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&failed(Reason::TerminalTransportError)),
            StatusCode::BAD_GATEWAY
        );
    }
}
