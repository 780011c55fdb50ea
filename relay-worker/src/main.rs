//! Deliver newline-delimited JSON payloads from stdin as one batch.
//!
//! Prints the batch result as JSON and exits non-zero if any item failed. With empty
//! input, sends a connectivity test instead.
use std::process::ExitCode;

use envconfig::Envconfig;
use eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use relay_common::delivery::SendOptions;
use relay_worker::config::Config;
use relay_worker::engine::DeliveryEngine;
use relay_worker::input::read_payloads;

fn setup_tracing() {
    // stdout carries the result, logs go to stderr.
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    setup_tracing();

    let config = Config::init_from_env().wrap_err("invalid configuration")?;
    let engine = DeliveryEngine::from_config(&config)
        .await
        .wrap_err("failed to initialize delivery engine")?;

    let routes = engine.validate_routes();
    if !routes.valid {
        info!(missing_routes = ?routes.missing_routes, "some event types fall back to the default lane");
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let payloads = read_payloads(stdin).await?;

    let success = if payloads.is_empty() {
        info!("no payloads on stdin, running connectivity test");
        let result = engine.test_connectivity().await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        result.success
    } else {
        let batch = engine.send_batch(&payloads, &SendOptions::default()).await;
        println!("{}", serde_json::to_string_pretty(&batch)?);
        batch.success
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
