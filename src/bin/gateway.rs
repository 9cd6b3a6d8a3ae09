// ============================================================================
// API Gateway Service
// ============================================================================
//
// Single entry point for the web client. It handles:
// - Credential issuing (/auth/login, /auth/register, /auth/refresh, ...)
// - JWT verification for protected routes
// - Request routing to the management, memories and scheduling services
//
// Stateless apart from the in-process credential store.
//
// ============================================================================

use anyhow::Result;
use memoria_gateway::config::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== API Gateway Service Starting ===");
    info!("Port: {}", config.port);
    info!(
        management = %config.services.management_service_url,
        repository = %config.services.repository_service_url,
        scheduling = %config.services.scheduling_service_url,
        timeout_secs = config.services.request_timeout_secs,
        "Backend services"
    );
    info!(
        public_paths = ?config.services.scheduling_public_paths,
        "Scheduling routes reachable without a token"
    );

    memoria_gateway::run(config).await
}
