// ============================================================================
// Route Table
// ============================================================================
//
// Ordered mapping from public path prefix to backend service and auth policy:
// - /manage/<path> → management service (token required)
// - /memos/<path>  → repository service (token required)
// - /event/<path>  → scheduling service (token required unless allowlisted)
//
// ============================================================================

use std::fmt;

use crate::gateway::authorizer::{authorize, AuthDecision, AuthPolicy};

/// Backend services behind the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Management,
    Repository,
    Scheduling,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Management => "management",
            ServiceKind::Repository => "repository",
            ServiceKind::Scheduling => "scheduling",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Public prefix without trailing slash, e.g. `/manage`
    pub prefix: &'static str,
    pub service: ServiceKind,
    pub policy: AuthPolicy,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Standard table; `scheduling_public_paths` is the scheduling allowlist.
    pub fn new<I, S>(scheduling_public_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: vec![
                RouteEntry {
                    prefix: "/manage",
                    service: ServiceKind::Management,
                    policy: AuthPolicy::Always,
                },
                RouteEntry {
                    prefix: "/memos",
                    service: ServiceKind::Repository,
                    policy: AuthPolicy::Always,
                },
                RouteEntry {
                    prefix: "/event",
                    service: ServiceKind::Scheduling,
                    policy: AuthPolicy::public_paths(scheduling_public_paths),
                },
            ],
        }
    }

    /// Finds the entry owning `path` and returns it with the sub-path
    /// (the remainder after `<prefix>/`, without a leading slash).
    pub fn resolve<'p>(&self, path: &'p str) -> Option<(&RouteEntry, &'p str)> {
        self.entries.iter().find_map(|entry| {
            let rest = path.strip_prefix(entry.prefix)?;
            if rest.is_empty() {
                Some((entry, ""))
            } else {
                rest.strip_prefix('/').map(|sub_path| (entry, sub_path))
            }
        })
    }

    /// Route Authorizer entry point. Pure: no I/O, no token parsing.
    pub fn authorize(
        &self,
        service: ServiceKind,
        sub_path: &str,
        has_valid_token: bool,
    ) -> AuthDecision {
        match self.entries.iter().find(|entry| entry.service == service) {
            Some(entry) => authorize(&entry.policy, sub_path, has_valid_token),
            None => authorize(&AuthPolicy::Always, sub_path, has_valid_token),
        }
    }
}

/// True when `sub_path` has a `.` or `..` segment, literal or percent-encoded.
///
/// URL parsing resolves these segments on the way out, so the backend would
/// see a different path from the one the allowlist was checked against.
/// Backslashes count as separators the same way they do for http URLs.
pub fn has_dot_segment(sub_path: &str) -> bool {
    let path = sub_path.split('?').next().unwrap_or_default();
    path.split(|c: char| c == '/' || c == '\\').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}
