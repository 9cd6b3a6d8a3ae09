// ============================================================================
// Request Normalizer
// ============================================================================
//
// Turns an inbound request into a transport-neutral ProxyRequest:
// - query string decoded into ordered (key, value) pairs
// - hop-by-hop and length/host headers removed
// - body parsed into JSON or multipart parts (uploaded files kept intact)
//
// A malformed body is rejected here, before any backend is contacted.
//
// ============================================================================

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::{
    ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, PROXY_AUTHORIZATION, TE,
    TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::route_table::ServiceKind;
use crate::gateway::service_client::ProxyMethod;

/// Set by the gateway from the verified token; never accepted from clients.
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

const KEEP_ALIVE: &str = "keep-alive";
const PROXY_CONNECTION: &str = "proxy-connection";

/// One uploaded file of a multipart request
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub content: Bytes,
}

#[derive(Debug, Clone)]
pub enum ProxyPayload {
    Empty,
    Json(Value),
    Multipart {
        files: Vec<MultipartPart>,
        fields: Vec<(String, String)>,
    },
}

impl ProxyPayload {
    /// JSON rendition of the payload. An absent body becomes `{}` and the
    /// text fields of a multipart body become an object.
    pub fn into_json(self) -> Value {
        match self {
            ProxyPayload::Empty => Value::Object(Map::new()),
            ProxyPayload::Json(value) => value,
            ProxyPayload::Multipart { fields, .. } => Value::Object(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, Value::String(value)))
                    .collect(),
            ),
        }
    }
}

/// Transport-neutral request bound for one backend service
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub service: ServiceKind,
    pub sub_path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub payload: ProxyPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Multipart,
    Unspecified,
    Other(String),
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return BodyKind::Unspecified;
    };
    let Ok(value) = value.to_str() else {
        return BodyKind::Other("<non-ascii content type>".to_string());
    };
    let mime = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match mime.as_str() {
        "" => BodyKind::Unspecified,
        "application/json" => BodyKind::Json,
        m if m.starts_with("application/") && m.ends_with("+json") => BodyKind::Json,
        "application/x-www-form-urlencoded" => BodyKind::Form,
        "multipart/form-data" => BodyKind::Multipart,
        _ => BodyKind::Other(mime),
    }
}

/// Builds the request a backend will see. `user_id` is the subject of the
/// caller's verified access token and becomes the `X-User-Id` header.
pub async fn normalize(
    request: Request,
    service: ServiceKind,
    sub_path: String,
    user_id: Option<Uuid>,
) -> Result<ProxyRequest, AppError> {
    let method = request.method().clone();
    let query = parse_query(request.uri().query());
    let kind = body_kind(request.headers());
    let mut headers = filter_headers(request.headers(), kind == BodyKind::Multipart);
    if let Some(user_id) = user_id {
        let value = HeaderValue::from_str(&user_id.to_string())
            .map_err(|e| AppError::internal(format!("invalid user id header: {}", e)))?;
        headers.insert(X_USER_ID, value);
    }

    let carries_body = ProxyMethod::from_method(&method).is_some_and(ProxyMethod::carries_body);

    let payload = match kind {
        // Never forwarded, so never parsed
        _ if !carries_body => ProxyPayload::Empty,
        BodyKind::Multipart => read_multipart(request).await?,
        kind => {
            let body = Bytes::from_request(request, &())
                .await
                .map_err(|rejection| body_error(rejection.status(), rejection.body_text()))?;
            payload_from_body(kind, body)?
        }
    };

    tracing::debug!(
        service = %service,
        method = %method,
        sub_path = %sub_path,
        query_params = query.len(),
        "Request normalized"
    );

    Ok(ProxyRequest {
        method,
        service,
        sub_path,
        query,
        headers,
        payload,
    })
}

/// Decodes a query string into ordered pairs, keeping repeated keys.
pub fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == CONNECTION
        || name == TE
        || name == TRAILER
        || name == TRANSFER_ENCODING
        || name == UPGRADE
        || name == PROXY_AUTHORIZATION
        || name.as_str() == KEEP_ALIVE
        || name.as_str() == PROXY_CONNECTION
}

/// Copies the headers that may travel to a backend.
///
/// Drops `Host`, `Content-Length`, `Accept-Encoding`, hop-by-hop headers
/// (including any listed in `Connection`) and `X-User-Id`. For multipart
/// bodies `Content-Type` is dropped too since the outbound boundary differs.
pub fn filter_headers(headers: &HeaderMap, multipart: bool) -> HeaderMap {
    let connection_listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let dropped = name == HOST
            || name == CONTENT_LENGTH
            || name == ACCEPT_ENCODING
            || name == X_USER_ID
            || is_hop_by_hop(name)
            || connection_listed.iter().any(|listed| listed == name.as_str())
            || (multipart && name == CONTENT_TYPE);
        if !dropped {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

fn payload_from_body(kind: BodyKind, body: Bytes) -> Result<ProxyPayload, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProxyPayload::Empty);
    }

    match kind {
        BodyKind::Json | BodyKind::Unspecified => {
            Ok(ProxyPayload::Json(serde_json::from_slice(&body)?))
        }
        BodyKind::Form => Ok(ProxyPayload::Json(Value::Object(
            url::form_urlencoded::parse(&body)
                .into_owned()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        ))),
        BodyKind::Multipart => Err(AppError::validation("Malformed multipart body")),
        BodyKind::Other(mime) => Err(AppError::UnsupportedMediaType(mime)),
    }
}

async fn read_multipart(request: Request) -> Result<ProxyPayload, AppError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| body_error(rejection.status(), rejection.body_text()))?;

    let mut files = Vec::new();
    let mut fields = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), e.body_text()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let content = field
                .bytes()
                .await
                .map_err(|e| body_error(e.status(), e.body_text()))?;
            files.push(MultipartPart {
                field_name,
                file_name,
                content_type,
                content,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| body_error(e.status(), e.body_text()))?;
            fields.push((field_name, value));
        }
    }

    Ok(ProxyPayload::Multipart { files, fields })
}

fn body_error(status: StatusCode, text: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(text)
    } else {
        AppError::validation(text)
    }
}
