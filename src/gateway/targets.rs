// ============================================================================
// Backend Targets
// ============================================================================
//
// Static backend locations and outbound URL composition.
//
// ============================================================================

use anyhow::Result;

use crate::config::{validate_base_url, ServicesConfig, TrailingSlash};
use crate::gateway::route_table::ServiceKind;

#[derive(Debug, Clone)]
pub struct BackendTarget {
    base_url: String,
    trailing_slash: TrailingSlash,
}

impl BackendTarget {
    pub fn new(base_url: &str, trailing_slash: TrailingSlash) -> Result<Self> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            trailing_slash,
        })
    }

    /// Outbound URL for `sub_path`: `<base>/<sub_path>`, cut at the first `?`
    /// and terminated according to the trailing-slash convention.
    /// The query string travels separately as parameters.
    pub fn url_for(&self, sub_path: &str) -> String {
        let joined = format!("{}/{}", self.base_url, sub_path);
        let path = match joined.split_once('?') {
            Some((path, _)) => path,
            None => joined.as_str(),
        };

        match self.trailing_slash {
            TrailingSlash::Force if path.ends_with('/') => path.to_string(),
            TrailingSlash::Force => format!("{}/", path),
            TrailingSlash::Strip => path.trim_end_matches('/').to_string(),
            TrailingSlash::Preserve => path.to_string(),
        }
    }
}

/// One target per backend service, fixed at startup
#[derive(Debug, Clone)]
pub struct BackendTargets {
    management: BackendTarget,
    repository: BackendTarget,
    scheduling: BackendTarget,
}

impl BackendTargets {
    pub fn from_config(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            management: BackendTarget::new(&config.management_service_url, config.trailing_slash)?,
            repository: BackendTarget::new(&config.repository_service_url, config.trailing_slash)?,
            scheduling: BackendTarget::new(&config.scheduling_service_url, config.trailing_slash)?,
        })
    }

    pub fn get(&self, service: ServiceKind) -> &BackendTarget {
        match service {
            ServiceKind::Management => &self.management,
            ServiceKind::Repository => &self.repository,
            ServiceKind::Scheduling => &self.scheduling,
        }
    }
}
