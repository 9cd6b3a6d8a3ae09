// ============================================================================
// Response Translator
// ============================================================================
//
// Converts a backend response into the client response:
// - JSON content type and parsable body → same status, same JSON bytes
// - JSON content type but unparsable body → same status, raw bytes
// - anything else → same status, raw bytes, original Content-Type and
//   Content-Disposition
//
// Backend statuses (4xx and 5xx included) are never rewritten.
//
// ============================================================================

use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::de::IgnoredAny;
use std::time::Duration;

use crate::gateway::route_table::ServiceKind;
use crate::gateway::service_client::{classify_error, ForwardError};

/// Backend body, classified. Both variants carry the bytes exactly as the
/// backend sent them; JSON is validated, never re-encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyBody {
    Json(Bytes),
    Raw(Bytes),
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub content_disposition: Option<HeaderValue>,
    pub body: ProxyBody,
}

impl ProxyResponse {
    /// Builds the client-facing response from an already buffered backend body.
    pub fn from_parts(
        status: StatusCode,
        content_type: Option<HeaderValue>,
        content_disposition: Option<HeaderValue>,
        body: Bytes,
    ) -> Self {
        let is_json = content_type
            .as_ref()
            .and_then(|ct| ct.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);

        if is_json {
            if serde_json::from_slice::<IgnoredAny>(&body).is_ok() {
                return Self {
                    status,
                    content_type,
                    content_disposition: None,
                    body: ProxyBody::Json(body),
                };
            }
            tracing::debug!(
                status = %status.as_u16(),
                "Backend sent invalid JSON, passing raw body"
            );
        }

        Self {
            status,
            content_type,
            content_disposition,
            body: ProxyBody::Raw(body),
        }
    }
}

/// Reads the full backend body and translates it.
///
/// A failure while reading the body is classified the same way as a failure
/// while sending the request.
pub async fn translate(
    response: reqwest::Response,
    service: ServiceKind,
    timeout: Duration,
) -> Result<ProxyResponse, ForwardError> {
    let status = response.status();
    let content_type = response.headers().get(CONTENT_TYPE).cloned();
    let content_disposition = response.headers().get(CONTENT_DISPOSITION).cloned();

    let body = response
        .bytes()
        .await
        .map_err(|e| classify_error(service, timeout, &e))?;

    Ok(ProxyResponse::from_parts(status, content_type, content_disposition, body))
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let (ProxyBody::Json(bytes) | ProxyBody::Raw(bytes)) = self.body;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        if let Some(content_type) = self.content_type {
            headers.insert(CONTENT_TYPE, content_type);
        }
        if let Some(disposition) = self.content_disposition {
            headers.insert(CONTENT_DISPOSITION, disposition);
        }
        response
    }
}
