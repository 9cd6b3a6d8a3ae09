// ============================================================================
// API Gateway
// ============================================================================
//
// Single entry point in front of the management, memories and scheduling
// services. Each request passes through:
// - route table (which backend, which auth policy)
// - authorizer (token required or not)
// - normalizer (transport-neutral request)
// - service client (outbound call)
// - translator (client response)
//
// The gateway holds no per-request shared state: every request is handled
// independently.
//
// ============================================================================

pub mod authorizer;
pub mod normalizer;
pub mod route_table;
pub mod router;
pub mod service_client;
pub mod targets;
pub mod translator;

pub use authorizer::{AuthDecision, AuthPolicy};
pub use normalizer::{MultipartPart, ProxyPayload, ProxyRequest};
pub use route_table::{RouteTable, ServiceKind};
pub use router::{GatewayRouter, GatewayState};
pub use service_client::{ForwardError, ServiceClient};
pub use targets::{BackendTarget, BackendTargets};
pub use translator::{ProxyBody, ProxyResponse};
