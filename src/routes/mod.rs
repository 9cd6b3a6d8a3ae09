// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: main router assembly and middleware
// - health.rs: health check and metrics endpoints
// - extractors.rs: custom Axum extractors (JWT)
// - middleware.rs: request id, request logging
//
// Everything not matched here falls through to the proxy handler, which owns
// the /manage, /memos and /event prefixes.
//
// ============================================================================

pub mod extractors;
pub mod health;
pub mod middleware;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthManager;
use crate::auth_service::{handlers as auth, AuthServiceContext};
use crate::config::{Config, CorsConfig};
use crate::gateway::router::{route_request, GatewayRouter, GatewayState};
use middleware::X_REQUEST_ID;

/// Create the gateway router from configuration
pub fn create_router(config: Arc<Config>) -> Result<Router> {
    let auth_manager = Arc::new(AuthManager::new(&config.security)?);
    let gateway_state = GatewayRouter::create_state(config.clone(), auth_manager.clone())?;
    let auth_context = Arc::new(AuthServiceContext::new(config, auth_manager));
    Ok(build_router(gateway_state, auth_context))
}

/// Assemble routes and middleware around prepared state
pub fn build_router(
    gateway_state: Arc<GatewayState>,
    auth_context: Arc<AuthServiceContext>,
) -> Router {
    let config = gateway_state.config.clone();

    // Registered with and without the trailing slash; clients use both.
    let auth_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/login/", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/register/", post(auth::register))
        .route("/auth/me", get(auth::me))
        .route("/auth/me/", get(auth::me))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/refresh/", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout/", post(auth::logout))
        .with_state(auth_context);

    // Everything outside /auth and /health falls through to the proxy
    let gateway_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::health_check))
        .route("/health/live", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .fallback(route_request)
        .with_state(gateway_state);

    Router::new()
        .merge(gateway_routes)
        .merge(auth_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        // Apply middleware (order matters - first added runs first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors))
                .layer(axum::middleware::from_fn(middleware::request_id))
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .into_inner(),
        )
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, X_REQUEST_ID])
        .expose_headers([CONTENT_DISPOSITION, X_REQUEST_ID])
        .allow_credentials(true)
}
