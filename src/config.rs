use anyhow::Result;

mod logging;
mod security;
mod services;

pub use logging::LoggingConfig;
pub use security::{CorsConfig, SecurityConfig};
pub use services::{ServicesConfig, TrailingSlash};
pub(crate) use services::validate_base_url;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Inbound request body limit. Covers multipart uploads to the memories service.
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024; // 100 MB

// ============================================================================
// Configuration Structures
// ============================================================================

/// Process-wide configuration, loaded once at startup and read-only afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub rust_log: String,
    /// Maximum accepted inbound body size in bytes
    pub max_upload_size: usize,
    pub services: ServicesConfig,
    pub security: SecurityConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_UPLOAD_SIZE),
            services: ServicesConfig::from_env()?,
            security: SecurityConfig::from_env()?,
            cors: CorsConfig::from_env(),
            logging: LoggingConfig::from_env()?,
        })
    }

    /// `host:port` the gateway listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Splits a comma separated variable into trimmed, non-empty entries.
pub(crate) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
