// ============================================================================
// Backend Services Configuration
// ============================================================================
//
// Static backend locations. There is no discovery: every target is read once
// from the environment and validated before the listener starts.
//
// ============================================================================

use anyhow::{Context, Result};
use std::str::FromStr;

use super::parse_list;

const DEFAULT_MANAGEMENT_SERVICE_URL: &str = "http://localhost:8001/api";
const DEFAULT_REPOSITORY_SERVICE_URL: &str = "http://localhost:8002/api";
const DEFAULT_SCHEDULING_SERVICE_URL: &str = "http://localhost:8003/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCHEDULING_PUBLIC_PATHS: &str = "future-activity,scheduled-events";

/// How the outbound URL path is terminated before it is sent to a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrailingSlash {
    /// Always end the path with `/` (the backends' URL convention)
    Force,
    /// Remove any trailing `/`
    Strip,
    /// Forward the path exactly as received
    Preserve,
}

impl FromStr for TrailingSlash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "force" => Ok(Self::Force),
            "strip" => Ok(Self::Strip),
            "preserve" => Ok(Self::Preserve),
            other => anyhow::bail!(
                "Invalid BACKEND_TRAILING_SLASH '{}': expected force, strip or preserve",
                other
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServicesConfig {
    pub management_service_url: String,
    pub repository_service_url: String,
    pub scheduling_service_url: String,
    pub trailing_slash: TrailingSlash,
    /// Upper bound for one backend exchange (connect, send, read body)
    pub request_timeout_secs: u64,
    /// Scheduling sub-paths reachable without a token, in match order
    pub scheduling_public_paths: Vec<String>,
}

impl ServicesConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let trailing_slash = match std::env::var("BACKEND_TRAILING_SLASH") {
            Ok(raw) => raw.parse()?,
            Err(_) => TrailingSlash::Force,
        };

        Ok(Self {
            management_service_url: service_url(
                "MANAGEMENT_SERVICE_URL",
                DEFAULT_MANAGEMENT_SERVICE_URL,
            )?,
            repository_service_url: service_url(
                "REPOSITORY_SERVICE_URL",
                DEFAULT_REPOSITORY_SERVICE_URL,
            )?,
            scheduling_service_url: service_url(
                "SCHEDULING_SERVICE_URL",
                DEFAULT_SCHEDULING_SERVICE_URL,
            )?,
            trailing_slash,
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            scheduling_public_paths: parse_list(
                &std::env::var("SCHEDULING_PUBLIC_PATHS")
                    .unwrap_or_else(|_| DEFAULT_SCHEDULING_PUBLIC_PATHS.to_string()),
            ),
        })
    }
}

/// Reads a backend base URL and checks it is an absolute http(s) URL.
fn service_url(var: &str, default: &str) -> Result<String> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    validate_base_url(&raw).with_context(|| format!("Invalid {}", var))
}

/// Returns the base URL without a trailing `/`.
pub(crate) fn validate_base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim()).context("not an absolute URL")?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("unsupported scheme '{}'", parsed.scheme());
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        anyhow::bail!("base URL must not carry a query or fragment");
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}
