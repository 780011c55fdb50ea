use std::sync::Arc;

use axum::Router;
use config::Config;
use envconfig::Envconfig;
use eyre::{Result, WrapErr};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use relay_common::metrics::{setup_metrics_recorder, setup_metrics_routes};
use relay_worker::engine::DeliveryEngine;

mod config;
mod handlers;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    tracing_subscriber::registry().with(log_layer).init();
}

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let config = Config::init_from_env().wrap_err("failed to load configuration from env")?;

    let engine = DeliveryEngine::from_config(&config.relay)
        .await
        .wrap_err("failed to initialize delivery engine")?;

    let routes = engine.validate_routes();
    if !routes.valid {
        warn!(missing_routes = ?routes.missing_routes, "some event types fall back to the default lane");
    }
    if engine.settings().webhook_url.is_none() {
        warn!("WEBHOOK_URL is not set, every send will fail with a configuration error");
    }

    let recorder_handle =
        setup_metrics_recorder().wrap_err("failed to install prometheus recorder")?;

    let app = handlers::add_routes(
        Router::new(),
        Arc::new(engine),
        config.max_body_size,
        config.concurrency_limit,
    );
    let app = setup_metrics_routes(app, recorder_handle);

    let bind = config.bind();
    info!(bind = %bind, "starting relay api");
    listen(app, bind).await
}
