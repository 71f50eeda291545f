use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::Response,
};

use super::headers::{forward_request_headers, infer_content_type, is_json_content_type, relay_response_headers};
use super::validate::validate_body;
use super::AppState;
use crate::error::GatewayError;

/// ANY /api/*path - forward the call to the backend origin
///
/// Method, path, query and body go out unchanged. The path is taken raw from
/// the URI, never decoded, so it reaches the backend exactly as sent. The backend's status and
/// body come back unchanged; only connection-scoped and CORS headers are
/// dropped. One attempt, no retry.
#[tracing::instrument(name = "proxy", skip_all, fields(method = %method, path = %uri.path()))]
pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let body = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected unreadable request body");
        GatewayError::from(rejection)
    })?;

    let resource = resource_of(uri.path());
    if !state.config.gateway.allows_resource(resource) {
        tracing::debug!(resource, "Rejected request for unknown resource");
        return Err(GatewayError::not_found(format!("Unknown resource '{}'", resource)));
    }

    if let Err(e) = validate_body(&method, &headers, &body) {
        tracing::debug!(error = %e, "Rejected request body before forwarding");
        return Err(e);
    }

    let target = outbound_url(state.config.gateway.origin_base(), &uri);
    let started = Instant::now();

    let mut outbound = state
        .client
        .request(method.clone(), &target)
        .headers(forward_request_headers(&headers));
    if !body.is_empty() {
        outbound = outbound.body(body);
    }

    let backend_response = outbound.send().await?;
    let status = backend_response.status();
    let mut relayed_headers = relay_response_headers(backend_response.headers());
    let payload = backend_response.bytes().await?;

    tracing::info!(
        status = status.as_u16(),
        bytes = payload.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Forwarded request"
    );

    check_declared_json(status, &relayed_headers, &payload)?;
    infer_content_type(&mut relayed_headers, &payload);

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        *headers = relayed_headers;
    }
    builder
        .body(Body::from(payload))
        .map_err(|e| GatewayError::internal(e.to_string()))
}

/// First segment under `/api/`, as it appears in the raw path.
pub fn resource_of(path: &str) -> &str {
    path.strip_prefix("/api/")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or_default()
}

/// Join the backend origin with the inbound path and query.
pub fn outbound_url(origin_base: &str, uri: &Uri) -> String {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{}{}", origin_base, path_and_query)
}

/// A body that claims to be JSON but does not parse is reported with its
/// raw text so the caller can see what the backend actually sent.
fn check_declared_json(status: StatusCode, headers: &HeaderMap, payload: &Bytes) -> Result<(), GatewayError> {
    let declared_json = headers
        .get(header::CONTENT_TYPE)
        .map(is_json_content_type)
        .unwrap_or(false);
    if !declared_json || payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }

    match serde_json::from_slice::<serde_json::Value>(payload) {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(status = status.as_u16(), error = %e, "Backend sent malformed JSON");
            Err(GatewayError::invalid_backend_response(
                status,
                String::from_utf8_lossy(payload).into_owned(),
            ))
        }
    }
}
