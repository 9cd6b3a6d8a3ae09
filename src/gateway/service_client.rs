// ============================================================================
// Service Client
// ============================================================================
//
// HTTP client for forwarding normalized requests to backend services.
// Handles:
// - URL composition (base URL + sub-path, trailing-slash convention)
// - body re-encoding (JSON or fresh multipart form)
// - total request timeout
// - failure classification (connection / timeout / internal)
//
// No retries: a failed exchange is reported to the caller as-is.
//
// ============================================================================

use anyhow::{Context, Result};
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::gateway::normalizer::{MultipartPart, ProxyPayload, ProxyRequest};
use crate::gateway::route_table::ServiceKind;
use crate::gateway::targets::BackendTarget;

/// Methods the gateway forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ProxyMethod {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::PATCH => Some(Self::Patch),
            Method::DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    /// Only POST, PUT and PATCH send a body; GET and DELETE carry query parameters only.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

/// Why a backend exchange produced no usable response
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("method {0} is not forwarded")]
    MethodNotAllowed(Method),

    #[error("connection to {service} failed: {detail}")]
    ConnectionFailed { service: ServiceKind, detail: String },

    #[error("{service} did not respond within {timeout:?}")]
    Timeout { service: ServiceKind, timeout: Duration },

    #[error("forwarding to {service} failed: {detail}")]
    Internal { service: ServiceKind, detail: String },
}

impl ForwardError {
    /// Metrics label
    pub fn outcome(&self) -> &'static str {
        match self {
            ForwardError::MethodNotAllowed(_) => "method_not_allowed",
            ForwardError::ConnectionFailed { .. } => "connection_failed",
            ForwardError::Timeout { .. } => "timeout",
            ForwardError::Internal { .. } => "error",
        }
    }
}

impl From<ForwardError> for AppError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::MethodNotAllowed(method) => {
                AppError::MethodNotAllowed(method.to_string())
            }
            ForwardError::ConnectionFailed { service, detail } => AppError::ServiceUnavailable {
                service: service.to_string(),
                detail,
            },
            ForwardError::Timeout { service, timeout } => AppError::GatewayTimeout {
                service: service.to_string(),
                detail: format!("no response within {:?}", timeout),
            },
            ForwardError::Internal { service, detail } => {
                AppError::internal(format!("forwarding to {} failed: {}", service, detail))
            }
        }
    }
}

/// Maps a reqwest failure onto the gateway's failure taxonomy.
pub fn classify_error(
    service: ServiceKind,
    timeout: Duration,
    err: &reqwest::Error,
) -> ForwardError {
    if err.is_timeout() {
        warn!(service = %service, timeout_secs = timeout.as_secs(), "Backend request timed out");
        ForwardError::Timeout { service, timeout }
    } else if err.is_connect() || err.is_request() || err.is_body() {
        warn!(service = %service, error = %err, "Failed to reach backend");
        ForwardError::ConnectionFailed {
            service,
            detail: err.to_string(),
        }
    } else {
        error!(service = %service, error = %err, "Backend request failed");
        ForwardError::Internal {
            service,
            detail: err.to_string(),
        }
    }
}

/// HTTP client for forwarding requests to backend services
pub struct ServiceClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            // Backends are internal; never route them through an environment proxy
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forward a normalized request to `target`.
    ///
    /// The returned response has not been read yet; its body is still bound
    /// by the client timeout.
    pub async fn forward(
        &self,
        request: ProxyRequest,
        target: &BackendTarget,
    ) -> Result<reqwest::Response, ForwardError> {
        let ProxyRequest {
            method,
            service,
            sub_path,
            query,
            mut headers,
            payload,
        } = request;

        let proxy_method =
            ProxyMethod::from_method(&method).ok_or(ForwardError::MethodNotAllowed(method))?;
        let url = target.url_for(&sub_path);

        debug!(
            service = %service,
            method = ?proxy_method,
            url = %url,
            "Forwarding request to backend"
        );

        let mut builder = self.client.request(proxy_method.as_method(), &url);
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        builder = if proxy_method.carries_body() {
            // reqwest appends its own Content-Type for both encodings
            headers.remove(CONTENT_TYPE);
            match payload {
                ProxyPayload::Multipart { files, fields } if !files.is_empty() => {
                    builder.headers(headers).multipart(build_form(files, fields))
                }
                payload => builder.headers(headers).json(&payload.into_json()),
            }
        } else {
            builder.headers(headers)
        };

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(service, self.timeout, &e))?;

        info!(
            service = %service,
            status = %response.status().as_u16(),
            duration_ms = started.elapsed().as_millis(),
            "Backend responded"
        );

        Ok(response)
    }
}

/// Multipart form with a freshly generated boundary. Text fields first,
/// then files with their names, filenames and content types.
fn build_form(files: Vec<MultipartPart>, fields: Vec<(String, String)>) -> Form {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in files {
        let part = || {
            let length = file.content.len() as u64;
            Part::stream_with_length(file.content.clone(), length)
        };
        let mut part = match file.content_type.as_deref() {
            Some(content_type) => match part().mime_str(content_type) {
                Ok(part) => part,
                Err(e) => {
                    warn!(
                        field = %file.field_name,
                        error = %e,
                        "Dropping unparsable part content type"
                    );
                    part()
                }
            },
            None => part(),
        };
        if let Some(file_name) = file.file_name {
            part = part.file_name(file_name);
        }
        form = form.part(file.field_name, part);
    }
    form
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_methods() {
        assert_eq!(ProxyMethod::from_method(&Method::GET), Some(ProxyMethod::Get));
        assert_eq!(ProxyMethod::from_method(&Method::PATCH), Some(ProxyMethod::Patch));
        assert_eq!(ProxyMethod::from_method(&Method::HEAD), None);
        assert_eq!(ProxyMethod::from_method(&Method::OPTIONS), None);
        assert_eq!(ProxyMethod::from_method(&Method::TRACE), None);

        assert!(ProxyMethod::Post.carries_body());
        assert!(ProxyMethod::Put.carries_body());
        assert!(ProxyMethod::Patch.carries_body());
        assert!(!ProxyMethod::Get.carries_body());
        assert!(!ProxyMethod::Delete.carries_body());
    }

    #[test]
    fn test_forward_errors_map_to_statuses() {
        use axum::http::StatusCode;

        let err: AppError = ForwardError::ConnectionFailed {
            service: ServiceKind::Management,
            detail: "refused".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: AppError = ForwardError::Timeout {
            service: ServiceKind::Scheduling,
            timeout: Duration::from_secs(30),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let err: AppError = ForwardError::MethodNotAllowed(Method::HEAD).into();
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);

        let err: AppError = ForwardError::Internal {
            service: ServiceKind::Repository,
            detail: "builder".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unsupported_method_never_reaches_network() {
        // Port 9 (discard) would fail to connect; the method check comes first.
        let client = ServiceClient::new(1).unwrap();
        let target =
            BackendTarget::new("http://127.0.0.1:9/api", crate::config::TrailingSlash::Force)
                .unwrap();
        let request = ProxyRequest {
            method: Method::HEAD,
            service: ServiceKind::Management,
            sub_path: "workspaces".into(),
            query: vec![],
            headers: Default::default(),
            payload: ProxyPayload::Empty,
        };
        let err = client.forward(request, &target).await.unwrap_err();
        assert!(matches!(err, ForwardError::MethodNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_multipart_files_are_sent_with_known_length() {
        use bytes::Bytes;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/memories/"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&backend)
            .await;

        let client = ServiceClient::new(5).unwrap();
        let base = format!("{}/api", backend.uri());
        let target = BackendTarget::new(&base, crate::config::TrailingSlash::Force).unwrap();
        let request = ProxyRequest {
            method: Method::POST,
            service: ServiceKind::Repository,
            sub_path: "memories".into(),
            query: vec![],
            headers: Default::default(),
            payload: ProxyPayload::Multipart {
                files: vec![
                    MultipartPart {
                        field_name: "image".into(),
                        file_name: Some("shell.png".into()),
                        content_type: Some("image/png".into()),
                        content: Bytes::from_static(b"\x89PNG shell bytes"),
                    },
                    MultipartPart {
                        field_name: "notes".into(),
                        file_name: Some("notes.txt".into()),
                        content_type: Some("not a mime".into()),
                        content: Bytes::from_static(b"low tide at noon"),
                    },
                ],
                fields: vec![("title".into(), "Shells".into())],
            },
        };

        let response = client.forward(request, &target).await.unwrap();
        assert_eq!(response.status(), 201);

        let received = backend.received_requests().await.unwrap();
        let request = &received[0];
        let length: usize = request.headers["content-length"].to_str().unwrap().parse().unwrap();
        assert_eq!(length, request.body.len());

        let body = &request.body;
        let contains = |needle: &[u8]| body.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"\x89PNG shell bytes"));
        assert!(contains(b"image/png"));
        assert!(contains(b"filename=\"notes.txt\""));
        assert!(contains(b"low tide at noon"));
        assert!(!contains(b"not a mime"));
    }
}
