use uuid::Uuid;

use crate::auth_service::store::{NewUser, UserStoreError, UserSummary};
use crate::auth_service::AuthServiceContext;
use crate::error::{AppError, FieldErrors};
use crate::metrics;

const LOGIN_PASSWORD_MIN_LEN: usize = 4;
const REGISTER_PASSWORD_MIN_LEN: usize = 6;
const NAME_MAX_LEN: usize = 150;

const REQUIRED: &str = "This field is required.";
const INVALID_EMAIL: &str = "Enter a valid email address.";

#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

pub async fn login(
    context: &AuthServiceContext,
    input: LoginInput,
) -> Result<LoginResult, AppError> {
    let mut errors = FieldErrors::new();
    let email = required(&mut errors, "email", input.email.as_deref())
        .and_then(|e| valid_email(&mut errors, "email", e));
    let password = required(&mut errors, "password", input.password.as_deref())
        .and_then(|p| min_len(&mut errors, "password", p, LOGIN_PASSWORD_MIN_LEN));
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::InvalidFields(errors));
    };

    let email_hash = context.config.logging.user_identifier(&email);

    let user = context.users.find_by_email(&email).await?;
    let Some(user) = user else {
        metrics::LOGINS_TOTAL.with_label_values(&["unknown_user"]).inc();
        tracing::warn!(email_hash = %email_hash, "Login for unknown email");
        return Err(AppError::auth("Invalid email or password"));
    };

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        metrics::LOGINS_TOTAL.with_label_values(&["bad_password"]).inc();
        tracing::warn!(email_hash = %email_hash, "Login with wrong password");
        return Err(AppError::auth("Invalid email or password"));
    }

    let access = context.auth_manager.create_access_token(&user.id)?;
    let refresh = context.auth_manager.create_refresh_token(&user.id)?;

    metrics::LOGINS_TOTAL.with_label_values(&["success"]).inc();
    tracing::info!(email_hash = %email_hash, user_id = %user.id, "User logged in");

    Ok(LoginResult {
        access_token: access.token,
        refresh_token: refresh.token,
        user: UserSummary::from(&user),
    })
}

pub async fn register(
    context: &AuthServiceContext,
    input: RegisterInput,
) -> Result<UserSummary, AppError> {
    let mut errors = FieldErrors::new();

    let username = required(&mut errors, "username", input.username.as_deref())
        .and_then(|u| valid_username(&mut errors, u));
    let email = required(&mut errors, "email", input.email.as_deref())
        .and_then(|e| valid_email(&mut errors, "email", e));
    let password = required(&mut errors, "password", input.password.as_deref())
        .and_then(|p| min_len(&mut errors, "password", p, REGISTER_PASSWORD_MIN_LEN));
    let password2 = required(&mut errors, "password2", input.password2.as_deref())
        .and_then(|p| min_len(&mut errors, "password2", p, REGISTER_PASSWORD_MIN_LEN));
    let first_name = optional_name(&mut errors, "first_name", input.first_name.as_deref());
    let last_name = optional_name(&mut errors, "last_name", input.last_name.as_deref());

    if let (Some(password), Some(password2)) = (password, password2) {
        if password != password2 {
            push(&mut errors, "password", "Password fields didn't match.");
        }
    }

    let (Some(username), Some(email), Some(password), true) =
        (username, email, password, errors.is_empty())
    else {
        return Err(AppError::InvalidFields(errors));
    };

    let password_hash =
        hash_password(password.to_string(), context.config.security.bcrypt_cost).await?;

    let user = context
        .users
        .create_user(NewUser {
            username: username.to_string(),
            email: email.clone(),
            first_name,
            last_name,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            UserStoreError::DuplicateEmail => {
                AppError::field("email", "A user with this email is already registered.")
            }
            UserStoreError::DuplicateUsername => {
                AppError::field("username", "A user with that username already exists.")
            }
            UserStoreError::Backend(e) => AppError::Unknown(e),
        })?;

    tracing::info!(
        email_hash = %context.config.logging.user_identifier(&email),
        user_id = %user.id,
        "User registered"
    );

    Ok(UserSummary::from(&user))
}

/// Exchange a refresh token for a new access token
pub async fn refresh_access_token(
    context: &AuthServiceContext,
    refresh_token: Option<&str>,
) -> Result<String, AppError> {
    let refresh_token = refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::field("refresh", "Refresh token is required."))?;

    let claims = context
        .auth_manager
        .verify_refresh_token(refresh_token)
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid refresh token");
            AppError::auth("Token is invalid or expired")
        })?;

    if context.revoked_tokens.is_revoked(&claims.jti).await {
        tracing::warn!(jti = %claims.jti, "Revoked refresh token presented");
        return Err(AppError::auth("Token is blacklisted"));
    }

    let user_id = claims
        .user_id()
        .map_err(|_| AppError::auth("Token is invalid or expired"))?;
    if context.users.find_by_id(&user_id).await?.is_none() {
        return Err(AppError::auth("User not found"));
    }

    let access = context.auth_manager.create_access_token(&user_id)?;
    tracing::debug!(user_id = %user_id, "Access token refreshed");
    Ok(access.token)
}

/// Revoke a refresh token belonging to the authenticated user
pub async fn logout(
    context: &AuthServiceContext,
    user_id: Uuid,
    refresh_token: Option<&str>,
) -> Result<(), AppError> {
    let refresh_token = refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::field("refresh", "Refresh token is required."))?;

    let claims = context
        .auth_manager
        .verify_refresh_token(refresh_token)
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid refresh token on logout");
            AppError::auth("Token is invalid or expired")
        })?;

    if claims.sub != user_id.to_string() {
        tracing::warn!(user_id = %user_id, "Logout with another user's refresh token");
        return Err(AppError::auth("Token is invalid or expired"));
    }

    if !context.revoked_tokens.revoke(&claims.jti, claims.exp).await {
        return Err(AppError::auth("Token is blacklisted"));
    }

    tracing::info!(user_id = %user_id, jti = %claims.jti, "User logged out");
    Ok(())
}

pub async fn whoami(context: &AuthServiceContext, user_id: Uuid) -> Result<UserSummary, AppError> {
    let user = context
        .users
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::auth("User not found"))?;
    Ok(UserSummary::from(&user))
}

// ============================================================================
// Password hashing (bcrypt is CPU bound, keep it off the async workers)
// ============================================================================

async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AppError::internal(format!("password hashing failed: {}", e)))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::internal(format!("password verification task failed: {}", e)))?
        .map_err(|e| AppError::internal(format!("password verification failed: {}", e)))
}

// ============================================================================
// Field validation
// ============================================================================

fn push(errors: &mut FieldErrors, field: &str, msg: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(msg.into());
}

fn required<'a>(errors: &mut FieldErrors, field: &str, value: Option<&'a str>) -> Option<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            push(errors, field, REQUIRED);
            None
        }
    }
}

fn min_len<'a>(
    errors: &mut FieldErrors,
    field: &str,
    value: &'a str,
    min: usize,
) -> Option<&'a str> {
    if value.chars().count() < min {
        push(
            errors,
            field,
            format!("Ensure this field has at least {} characters.", min),
        );
        return None;
    }
    Some(value)
}

/// Validates and normalizes an email: trimmed, domain lowercased.
pub(crate) fn normalize_email(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let (local, domain) = raw.rsplit_once('@')?;
    let domain_ok = !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || !domain_ok || raw.chars().any(char::is_whitespace) {
        return None;
    }
    Some(format!("{}@{}", local, domain.to_ascii_lowercase()))
}

fn valid_email(errors: &mut FieldErrors, field: &str, value: &str) -> Option<String> {
    let email = normalize_email(value);
    if email.is_none() {
        push(errors, field, INVALID_EMAIL);
    }
    email
}

fn valid_username<'a>(errors: &mut FieldErrors, value: &'a str) -> Option<&'a str> {
    if value.chars().count() > NAME_MAX_LEN {
        push(
            errors,
            "username",
            format!("Ensure this field has no more than {} characters.", NAME_MAX_LEN),
        );
        return None;
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-');
    if !value.chars().all(allowed) {
        push(
            errors,
            "username",
            "Enter a valid username. This value may contain only letters, \
             numbers, and @/./+/-/_ characters.",
        );
        return None;
    }
    Some(value)
}

fn optional_name(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> String {
    let value = value.unwrap_or_default().trim();
    if value.chars().count() > NAME_MAX_LEN {
        push(
            errors,
            field,
            format!("Ensure this field has no more than {} characters.", NAME_MAX_LEN),
        );
    }
    value.to_string()
}
