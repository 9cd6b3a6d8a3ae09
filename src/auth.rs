use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SecurityConfig;

/// Which of the two token kinds a JWT is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub jti: String, // JWT ID (unique per token)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
    pub iss: String, // Issuer
    pub token_type: TokenType,
}

impl Claims {
    /// Subject as a user id
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).context("Token subject is not a valid user id")
    }
}

/// A freshly signed token with the values needed to track or revoke it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: i64,
}

pub struct AuthManager {
    /// Encoding key (private key for RS256, secret for HS256).
    /// None when only a public key is configured.
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_ttl_hours: i64,
    refresh_token_ttl_days: i64,
    issuer: String,
}

impl AuthManager {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        // 1. RS256 full (sign + verify): private + public key
        // 2. RS256 verify-only: public key only
        // 3. HS256: secret only
        let (algorithm, encoding_key, decoding_key) = match (
            config.jwt_private_key.as_deref().filter(|k| !k.trim().is_empty()),
            config.jwt_public_key.as_deref().filter(|k| !k.trim().is_empty()),
        ) {
            (Some(private_key), Some(public_key)) => {
                tracing::info!(
                    "Initializing JWT with RS256 algorithm (full mode: can sign and verify)"
                );
                let encoding_key = EncodingKey::from_rsa_pem(private_key.as_bytes())
                    .context("Failed to parse JWT_PRIVATE_KEY as RSA PEM")?;
                let decoding_key = DecodingKey::from_rsa_pem(public_key.as_bytes())
                    .context("Failed to parse JWT_PUBLIC_KEY as RSA PEM")?;
                (Algorithm::RS256, Some(encoding_key), decoding_key)
            }
            (None, Some(public_key)) => {
                tracing::info!(
                    "Initializing JWT with RS256 algorithm (verify-only mode: no private key)"
                );
                let decoding_key = DecodingKey::from_rsa_pem(public_key.as_bytes())
                    .context("Failed to parse JWT_PUBLIC_KEY as RSA PEM")?;
                (Algorithm::RS256, None, decoding_key)
            }
            _ if !config.jwt_secret.is_empty() => {
                tracing::info!("Initializing JWT with HS256 algorithm");
                (
                    Algorithm::HS256,
                    Some(EncodingKey::from_secret(config.jwt_secret.as_bytes())),
                    DecodingKey::from_secret(config.jwt_secret.as_bytes()),
                )
            }
            _ => anyhow::bail!(
                "No JWT configuration provided. Set either:\n\
                - JWT_PUBLIC_KEY (for verify-only mode)\n\
                - JWT_PRIVATE_KEY + JWT_PUBLIC_KEY (for RS256 full mode)\n\
                - JWT_SECRET (for HS256 mode)"
            ),
        };

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm,
            access_token_ttl_hours: config.access_token_ttl_hours,
            refresh_token_ttl_days: config.refresh_token_ttl_days,
            issuer: config.jwt_issuer.clone(),
        })
    }

    /// Create access token (presented as `Authorization: Bearer` on every call)
    pub fn create_access_token(&self, user_id: &Uuid) -> Result<IssuedToken> {
        self.issue(user_id, TokenType::Access, Duration::hours(self.access_token_ttl_hours))
    }

    /// Create refresh token (exchanged at `/auth/refresh/` for a new access token)
    pub fn create_refresh_token(&self, user_id: &Uuid) -> Result<IssuedToken> {
        self.issue(user_id, TokenType::Refresh, Duration::days(self.refresh_token_ttl_days))
    }

    fn issue(&self, user_id: &Uuid, token_type: TokenType, ttl: Duration) -> Result<IssuedToken> {
        let encoding_key = self.encoding_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "Cannot create tokens: AuthManager is in verify-only mode \
                 (no JWT_PRIVATE_KEY configured)"
            )
        })?;

        let now = Utc::now();
        let exp = now + ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            token_type,
        };

        let token = encode(&Header::new(self.algorithm), &claims, encoding_key)
            .context("Failed to encode JWT token")?;

        Ok(IssuedToken {
            token,
            jti,
            expires_at: exp.timestamp(),
        })
    }

    /// Verify signature, expiry and issuer of a token, whatever its type
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).context("Malformed token header")?;
        if header.alg != self.algorithm {
            anyhow::bail!(
                "Token uses {:?} but the gateway verifies {:?} tokens",
                header.alg,
                self.algorithm
            );
        }

        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[self.issuer.clone()]);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        self.verify_typed(token, TokenType::Access)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims> {
        self.verify_typed(token, TokenType::Refresh)
    }

    fn verify_typed(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let claims = self.verify_token(token)?;
        if claims.token_type != expected {
            anyhow::bail!("Expected {:?} token, got {:?}", expected, claims.token_type);
        }
        Ok(claims)
    }
}
