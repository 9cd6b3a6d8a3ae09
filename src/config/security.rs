// ============================================================================
// Security Configuration
// ============================================================================
//
// JWT signing material, token lifetimes, password hashing cost and the CORS
// origin allowlist.
//
// ============================================================================

use anyhow::Result;

use super::parse_list;

const DEFAULT_ACCESS_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_JWT_ISSUER: &str = "memoria-gateway";
const MIN_JWT_SECRET_LEN: usize = 32;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:8000,\
http://127.0.0.1:3000,http://127.0.0.1:8000";

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// HS256 secret. Optional when both RSA keys are configured.
    pub jwt_secret: String,
    /// RS256 private key in PEM format (signing)
    pub jwt_private_key: Option<String>,
    /// RS256 public key in PEM format (verification)
    pub jwt_public_key: Option<String>,
    pub jwt_issuer: String,
    pub access_token_ttl_hours: i64,
    pub refresh_token_ttl_days: i64,
    pub bcrypt_cost: u32,
}

impl SecurityConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let jwt_private_key = read_pem("JWT_PRIVATE_KEY");
        let jwt_public_key = read_pem("JWT_PUBLIC_KEY");

        let jwt_secret = if jwt_private_key.is_some() && jwt_public_key.is_some() {
            std::env::var("JWT_SECRET").unwrap_or_default()
        } else {
            let secret = std::env::var("JWT_SECRET").map_err(|_| {
                anyhow::anyhow!(
                    "JWT_SECRET is required unless JWT_PRIVATE_KEY and JWT_PUBLIC_KEY are set"
                )
            })?;
            if secret.len() < MIN_JWT_SECRET_LEN {
                anyhow::bail!(
                    "JWT_SECRET must be at least {} characters long, \
                     or use JWT_PRIVATE_KEY/JWT_PUBLIC_KEY for RS256",
                    MIN_JWT_SECRET_LEN
                );
            }
            secret
        };

        Ok(Self {
            jwt_secret,
            jwt_private_key,
            jwt_public_key,
            jwt_issuer: std::env::var("JWT_ISSUER")
                .unwrap_or_else(|_| DEFAULT_JWT_ISSUER.to_string()),
            access_token_ttl_hours: std::env::var("JWT_ACCESS_TOKEN_LIFETIME_HOURS")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_HOURS),
            refresh_token_ttl_days: std::env::var("JWT_REFRESH_TOKEN_LIFETIME_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            bcrypt_cost: std::env::var("BCRYPT_COST")
                .ok()
                .and_then(|c| c.parse().ok())
                .unwrap_or(bcrypt::DEFAULT_COST),
        })
    }
}

/// Loads a PEM either inline from the variable or from the file it points to.
fn read_pem(var: &str) -> Option<String> {
    let value = std::env::var(var).ok()?;
    if value.trim().is_empty() {
        return None;
    }
    if value.starts_with("-----BEGIN") {
        return Some(value);
    }
    match std::fs::read_to_string(&value) {
        Ok(pem) => Some(pem),
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %value,
                "Failed to read {} from file, using as-is",
                var
            );
            Some(value)
        }
    }
}

/// Browser origins allowed to call the gateway
#[derive(Clone, Debug)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            allowed_origins: parse_list(
                &std::env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
        }
    }
}
