// ============================================================================
// Auth Service
// ============================================================================
//
// Credential & token issuer served by the gateway itself under /auth/*:
// login, register, refresh, logout, me.
//
// ============================================================================

pub mod core;
pub mod handlers;
pub mod store;

use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::Config;
use store::{InMemoryUserStore, RevokedTokens, UserStore};

/// Auth Service context
#[derive(Clone)]
pub struct AuthServiceContext {
    pub users: Arc<dyn UserStore>,
    pub revoked_tokens: Arc<RevokedTokens>,
    pub auth_manager: Arc<AuthManager>,
    pub config: Arc<Config>,
}

impl AuthServiceContext {
    pub fn new(config: Arc<Config>, auth_manager: Arc<AuthManager>) -> Self {
        Self::with_store(config, auth_manager, Arc::new(InMemoryUserStore::new()))
    }

    pub fn with_store(
        config: Arc<Config>,
        auth_manager: Arc<AuthManager>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            users,
            revoked_tokens: Arc::new(RevokedTokens::new()),
            auth_manager,
            config,
        }
    }
}
