//! Paylog API Server
//!
//! This crate provides the HTTP server of the Paylog demo service. Each call
//! to `GET /paymentlog` generates a synthetic payment log under a traced,
//! logged, and metered operation.
//!
//! # Architecture
//!
//! The API server is built on Axum and Tokio, providing:
//! - `GET /paymentlog` and the `GET /error` demo route
//! - `GET /metrics` for Prometheus scrapers
//! - `GET /health` for load balancers
//!
//! Telemetry is exported through the sinks configured in the environment
//! and flushed on graceful shutdown.
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
pub mod operation;
pub mod payment;
mod routes;
mod state;

pub use config::{Config, ConfigError, ShopSettings};
pub use operation::{OperationError, ReportOperation};
pub use state::{AppState, CapturedTelemetry};

use anyhow::Result;
use axum::Router;
use telemetry::config::TelemetryConfig;
use telemetry::Telemetry;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Runs the Paylog API server.
///
/// This function initializes the server and telemetry with configuration
/// from environment variables and starts listening for incoming
/// connections. It handles graceful shutdown on SIGTERM/SIGINT signals.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    let telemetry_config = TelemetryConfig::from_env()?;
    run_server_with_config(config, telemetry_config).await
}

/// Runs the Paylog API server with the provided configuration.
///
/// This is useful for testing or when you want to provide configuration programmatically.
///
/// # Errors
///
/// Returns an error if:
/// - The telemetry configuration is invalid
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(
    config: Config,
    telemetry_config: TelemetryConfig,
) -> Result<()> {
    let addr = config.socket_addr()?;
    let telemetry = Telemetry::init(&telemetry_config)?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        service = %telemetry.resource().service_name(),
        "Paylog API server starting"
    );

    let app = create_router(AppState::new(telemetry.clone(), config.shop));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !telemetry.shutdown().await {
        tracing::warn!("Some telemetry could not be delivered before shutdown");
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::payment_routes(state.clone()))
        .merge(routes::metrics_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
