// ============================================================================
// Route Authorizer
// ============================================================================
//
// Decides whether a request needs a valid access token. The decision only
// looks at the service policy and the sub-path; it never touches the network.
//
// ============================================================================

/// Authentication policy of one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Every sub-path requires a valid token
    Always,
    /// Sub-paths under one of these entries are public, the rest require a token
    PublicPaths(Vec<String>),
}

impl AuthPolicy {
    /// Builds an allowlist. Entries are trimmed of whitespace and slashes and
    /// blank entries are dropped, so an empty sub-path is never public.
    pub fn public_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AuthPolicy::PublicPaths(
            paths
                .into_iter()
                .map(|p| p.as_ref().trim().trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    pub fn requires_auth(&self, sub_path: &str) -> bool {
        match self {
            AuthPolicy::Always => true,
            AuthPolicy::PublicPaths(public) => {
                !public.iter().any(|p| matches_public_path(p, sub_path))
            }
        }
    }
}

/// Outcome of authorization for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthDecision {
    pub required: bool,
    pub has_valid_token: bool,
}

impl AuthDecision {
    pub fn is_permitted(&self) -> bool {
        !self.required || self.has_valid_token
    }
}

pub fn authorize(policy: &AuthPolicy, sub_path: &str, has_valid_token: bool) -> AuthDecision {
    AuthDecision {
        required: policy.requires_auth(sub_path),
        has_valid_token,
    }
}

/// `sub_path` (leading slashes ignored) is public under `allowed` when it is
/// exactly `allowed` or continues it with `/` or `?`.
pub fn matches_public_path(allowed: &str, sub_path: &str) -> bool {
    let path = sub_path.trim_start_matches('/');
    match path.strip_prefix(allowed) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}
