// ============================================================================
// Health and Metrics Routes
// ============================================================================
//
// Endpoints:
// - GET /health, /health/live, /health/ready - liveness
// - GET /metrics - Prometheus metrics
//
// ============================================================================

use axum::{http::StatusCode, response::IntoResponse};

use crate::error::AppError;
use crate::metrics;

/// GET /health
pub async fn health_check() -> &'static str {
    "ok"
}

/// GET /metrics
/// Prometheus metrics endpoint
pub async fn metrics() -> Result<impl IntoResponse, AppError> {
    let metrics_data = metrics::gather_metrics()
        .map_err(|e| AppError::internal(format!("Failed to gather metrics: {}", e)))?;
    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics_data,
    ))
}
