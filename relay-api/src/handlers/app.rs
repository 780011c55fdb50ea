use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing, Router};
use relay_worker::engine::DeliveryEngine;
use tower::limit::ConcurrencyLimitLayer;

use super::webhook;

pub fn add_routes(
    router: Router,
    engine: Arc<DeliveryEngine>,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No async loop, just check axum health
        .route(
            "/webhook",
            routing::post(webhook::post_webhook)
                .with_state(engine.clone())
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/webhook/batch",
            routing::post(webhook::post_batch)
                .with_state(engine.clone())
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/test",
            routing::post(webhook::post_test)
                .with_state(engine.clone())
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit)),
        )
        .route("/health", routing::get(webhook::get_health).with_state(engine.clone()))
        .route("/stats", routing::get(webhook::get_stats).with_state(engine))
}

pub async fn index() -> &'static str {
    "club webhook relay"
}
