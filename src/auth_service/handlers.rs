// ============================================================================
// Auth Service Handlers
// ============================================================================
//
// HTTP surface of the credential issuer. Request bodies are JSON; field names
// follow the snake_case contract the web client already speaks.
//
// ============================================================================

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::auth_service::core::{self, LoginInput, RegisterInput};
use crate::auth_service::store::UserSummary;
use crate::auth_service::AuthServiceContext;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub refresh: String,
    pub access: String,
    pub user: UserSummary,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Body of both refresh and logout
#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponse {
    pub access: String,
}

/// Unwraps a JSON body, reporting rejections in the gateway's error shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

/// POST /auth/login/
pub async fn login(
    State(context): State<Arc<AuthServiceContext>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = json_body(payload)?;
    let result = core::login(
        &context,
        LoginInput {
            email: request.email,
            password: request.password,
        },
    )
    .await?;

    Ok(Json(LoginResponse {
        refresh: result.refresh_token,
        access: result.access_token,
        user: result.user,
    }))
}

/// POST /auth/register/
pub async fn register(
    State(context): State<Arc<AuthServiceContext>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = json_body(payload)?;
    let user = core::register(
        &context,
        RegisterInput {
            username: request.username,
            email: request.email,
            password: request.password,
            password2: request.password2,
            first_name: request.first_name,
            last_name: request.last_name,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /auth/me/
pub async fn me(
    State(context): State<Arc<AuthServiceContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let user = core::whoami(&context, user_id).await?;
    Ok(Json(user))
}

/// POST /auth/refresh/
pub async fn refresh_token(
    State(context): State<Arc<AuthServiceContext>>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = json_body(payload)?;
    let access = core::refresh_access_token(&context, request.refresh.as_deref()).await?;
    Ok(Json(RefreshTokenResponse { access }))
}

/// POST /auth/logout/
pub async fn logout(
    State(context): State<Arc<AuthServiceContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = json_body(payload)?;
    core::logout(&context, user_id, request.refresh.as_deref()).await?;
    Ok(Json(json!({ "detail": "Successfully logged out." })))
}
