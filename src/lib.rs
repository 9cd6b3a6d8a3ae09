use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

pub mod auth;
pub mod auth_service;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod routes;
pub mod utils;

use config::Config;

/// Bind the listener and serve until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let app = routes::create_router(config.clone())?;

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("API Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received. Shutting down...");
}
