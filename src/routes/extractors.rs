// ============================================================================
// Axum Extractors
// ============================================================================
//
// AuthenticatedUser: validates the bearer access token and yields the user id.
//
// ============================================================================

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth_service::AuthServiceContext;
use crate::error::AppError;
use crate::utils::bearer_token;

/// Extractor for authenticated user ID from JWT token
///
/// Usage:
/// ```rust,ignore
/// async fn handler(user: AuthenticatedUser, ...) -> Result<...> {
///     let user_id = user.0;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl FromRequestParts<Arc<AuthServiceContext>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AuthServiceContext>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            AppError::auth("Authentication credentials were not provided").into_response()
        })?;

        let claims = state.auth_manager.verify_access_token(token).map_err(|e| {
            tracing::warn!(error = %e, "JWT authentication failed");
            AppError::auth("Invalid or expired token").into_response()
        })?;

        let user_id = claims.user_id().map_err(|e| {
            tracing::warn!(error = %e, "JWT subject is not a user id");
            AppError::auth("Invalid or expired token").into_response()
        })?;

        Ok(AuthenticatedUser(user_id))
    }
}
