// ============================================================================
// Credential Storage
// ============================================================================
//
// Users and revoked refresh tokens. The gateway keeps both in process memory;
// the `UserStore` trait is the seam for a persistent implementation.
//
// ============================================================================

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// Public view of a user, as returned by register, login and me
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("username already taken")]
    DuplicateUsername,

    #[error("user store failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Storage interface for gateway users
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Email and username must both be unused.
    async fn create_user(&self, new_user: NewUser) -> Result<User, UserStoreError>;

    /// Find a user by (normalized) email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>>;
}

/// In-memory implementation of UserStore
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, UserStoreError> {
        // Uniqueness check and insert happen under one write lock
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == new_user.email) {
            return Err(UserStoreError::DuplicateEmail);
        }
        if users.values().any(|u| u.username == new_user.username) {
            return Err(UserStoreError::DuplicateUsername);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }
}

/// Refresh tokens revoked by logout, keyed by `jti`.
///
/// Entries are kept until the token would have expired anyway.
#[derive(Default)]
pub struct RevokedTokens {
    entries: RwLock<HashMap<String, i64>>,
}

impl RevokedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token. Returns false if it was already revoked.
    pub async fn revoke(&self, jti: &str, expires_at: i64) -> bool {
        let now = Utc::now().timestamp();
        let mut entries = self.entries.write().await;
        entries.retain(|_, exp| *exp > now);
        if entries.contains_key(jti) {
            return false;
        }
        entries.insert(jti.to_string(), expires_at);
        true
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.entries.read().await.contains_key(jti)
    }
}
