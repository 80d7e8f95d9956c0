//! Tabload Server - Main entry point

use anyhow::Result;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tabload_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tabload_server::{
    config::Config,
    notify::{HttpMailer, Notifier},
    pipeline::{IngestionRequest, Pipeline, RunSummary, UploadEvent},
    secrets::EnvSecretStore,
    storage::{config::StorageConfig, S3Store},
    warehouse::rest::{RestWarehouse, WarehouseConfig},
};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::from_env().unwrap_or_default();
    init_logging(&log_config)?;

    info!("Starting tabload server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize the object store adapter
    let storage_config = StorageConfig::from_env()?;
    let store = Arc::new(S3Store::new(storage_config));

    // Initialize the warehouse adapter
    let warehouse_config = WarehouseConfig::from_env()?;
    let warehouse = Arc::new(RestWarehouse::new(warehouse_config)?);

    // Initialize the notifier; delivery credentials load lazily on first use
    let mailer = Arc::new(HttpMailer::from_env()?);
    let notifier = Notifier::new(
        mailer,
        Arc::new(EnvSecretStore),
        config.pipeline.email_enabled,
    );

    let pipeline = Arc::new(Pipeline::new(
        store,
        warehouse,
        notifier,
        config.pipeline.clone(),
    ));

    let state = AppState { pipeline };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/events", post(handle_event))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Upload event handler
///
/// Runs the pipeline to completion and acknowledges with the same fixed
/// response on every code path, including failures. Signaling an error here
/// would make the trigger host re-deliver the event and reprocess a file
/// the pipeline already consumed or already reported on; with a dead mail
/// provider the logs are the only failure evidence, and that tradeoff is
/// intended.
async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<UploadEvent>,
) -> Json<serde_json::Value> {
    let summary = state.pipeline.run(IngestionRequest::from(event)).await;

    if let RunSummary::Failed { error } = &summary {
        warn!(error = %error, "Run failed; event acknowledged anyway");
    }

    Json(json!({ "status": "ok" }))
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give the in-flight run time to finish its network calls
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
