//! Fraud Risk Scorer - Main Entry Point
//!
//! Loads the classifier and preprocessing artifacts, then serves the HTTP
//! scoring API. Optionally scores transactions streamed over NATS.

use anyhow::{Context, Result};
use fraud_risk_scorer::{
    config::{AppConfig, LogFormat, LoggingConfig},
    http::{create_router, AppState},
    metrics::MetricsReporter,
    service::ScoringService,
    stream::StreamWorker,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_tracing(&config.logging)?;

    info!("Starting Fraud Risk Scorer");
    info!(
        "Decision threshold: {:.2}, model: {}",
        config.risk.decision_threshold,
        config.models.classifier_path().display()
    );

    // Refuse to serve on a partially loaded model
    let service = Arc::new(
        ScoringService::from_config(&config).context("Failed to load scoring artifacts")?,
    );
    let metrics = service.metrics().clone();

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let stream_task = if config.nats.enabled {
        let worker = StreamWorker::new(service.clone(), config.nats.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!(error = %e, "Stream worker stopped");
            }
        }))
    } else {
        None
    };

    let app = create_router(AppState::new(service), &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some(task) = stream_task {
        task.abort();
    }

    // Print final summary
    info!("Scorer shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "fraud_risk_scorer={},tower_http=info",
            logging.level
        ))
    })?;

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
