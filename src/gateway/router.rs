// ============================================================================
// Gateway Router
// ============================================================================
//
// Proxy handler. For each request:
// 1. resolve the route (prefix → service, sub-path), refusing dot segments
// 2. authorize (no I/O)
// 3. normalize the request
// 4. forward it to the backend target
// 5. translate the backend response
//
// ============================================================================

use anyhow::Result;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthManager;
use crate::config::Config;
use crate::error::AppError;
use crate::gateway::normalizer::normalize;
use crate::gateway::route_table::{has_dot_segment, RouteTable};
use crate::gateway::service_client::ServiceClient;
use crate::gateway::targets::BackendTargets;
use crate::gateway::translator::translate;
use crate::metrics;
use crate::utils::bearer_token;

/// Gateway router state
pub struct GatewayState {
    pub config: Arc<Config>,
    pub routes: RouteTable,
    pub targets: BackendTargets,
    pub service_client: ServiceClient,
    pub auth_manager: Arc<AuthManager>,
}

pub struct GatewayRouter;

impl GatewayRouter {
    pub fn create_state(
        config: Arc<Config>,
        auth_manager: Arc<AuthManager>,
    ) -> Result<Arc<GatewayState>> {
        let routes = RouteTable::new(&config.services.scheduling_public_paths);
        let targets = BackendTargets::from_config(&config.services)?;
        let service_client = ServiceClient::new(config.services.request_timeout_secs)?;

        Ok(Arc::new(GatewayState {
            config,
            routes,
            targets,
            service_client,
            auth_manager,
        }))
    }
}

/// User id of a valid bearer access token, if the request carries one
fn authenticated_user(state: &GatewayState, request: &Request) -> Option<Uuid> {
    let token = bearer_token(request.headers())?;
    match state.auth_manager.verify_access_token(token) {
        Ok(claims) => claims.user_id().ok(),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring invalid bearer token");
            None
        }
    }
}

/// Route request to the backend service owning its path prefix
pub async fn route_request(
    State(state): State<Arc<GatewayState>>,
    request: Request,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();

    let Some((entry, sub_path)) = state.routes.resolve(&path) else {
        return Err(AppError::NotFound(format!("No route for {}", path)));
    };
    let service = entry.service;
    if has_dot_segment(sub_path) {
        return Err(AppError::validation("Path must not contain '.' or '..' segments"));
    }
    let sub_path = sub_path.to_string();

    let user_id = authenticated_user(&state, &request);
    let decision = state.routes.authorize(service, &sub_path, user_id.is_some());
    if !decision.is_permitted() {
        metrics::AUTH_REJECTIONS_TOTAL
            .with_label_values(&[service.as_str()])
            .inc();
        return Err(AppError::auth(
            "Authentication credentials were not provided or are invalid",
        ));
    }

    let proxy_request = normalize(request, service, sub_path, user_id).await?;

    let target = state.targets.get(service);
    let timeout = state.service_client.timeout();
    let timer = metrics::PROXY_REQUEST_DURATION
        .with_label_values(&[service.as_str()])
        .start_timer();

    let result = match state.service_client.forward(proxy_request, target).await {
        Ok(response) => translate(response, service, timeout).await,
        Err(e) => Err(e),
    };
    timer.observe_duration();

    match result {
        Ok(response) => {
            metrics::PROXY_REQUESTS_TOTAL
                .with_label_values(&[service.as_str(), "forwarded"])
                .inc();
            Ok(response.into_response())
        }
        Err(e) => {
            metrics::PROXY_REQUESTS_TOTAL
                .with_label_values(&[service.as_str(), e.outcome()])
                .inc();
            Err(e.into())
        }
    }
}
