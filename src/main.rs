//! Fraud Verification Service - Main Entry Point
//!
//! Drains the durable transaction event queue and reconciles every event
//! against the transaction database, acking, dropping or requeueing per
//! the verification policy.

use anyhow::Result;
use fraud_ingest::{
    config::AppConfig,
    metrics::{MetricsReporter, PipelineMetrics},
    store::TransactionStore,
    verifier::VerificationConsumer,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fraud_ingest=info".parse()?),
        )
        .init();

    info!("Starting Fraud Verification Service");

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");
    info!(
        "Queue: {} (stream {}, durable {}, max_ack_pending {})",
        config.queue.url, config.queue.stream, config.queue.durable_name, config.queue.max_ack_pending
    );

    let store = Arc::new(TransactionStore::connect(&config.database).await?);
    info!("Database ready at {}", config.database.path);

    let metrics = Arc::new(PipelineMetrics::new());

    // Start metrics reporter (prints summary every 30 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 30);
        reporter.start().await;
    });

    let consumer = VerificationConsumer::new(store, config.queue.clone(), metrics.clone());
    consumer.run().await?;

    // Print final summary
    info!("Verification service shutting down...");
    metrics.print_summary();

    Ok(())
}
