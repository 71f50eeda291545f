//! Header rules applied on both legs of a forwarded call.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Request headers that describe the inbound connection and must be
/// recomputed by the outbound client rather than copied.
const REQUEST_STRIP: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Response headers that belong to the backend's connection.
const RESPONSE_STRIP: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "proxy-connection",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_request_stripped(name: &HeaderName) -> bool {
    REQUEST_STRIP.contains(&name.as_str())
}

fn is_response_stripped(name: &HeaderName) -> bool {
    // The caller talks to the gateway same-origin, backend CORS grants are meaningless to it
    RESPONSE_STRIP.contains(&name.as_str()) || name.as_str().starts_with("access-control-")
}

/// Headers to send to the backend for an inbound request.
///
/// `Authorization` is always present on the outbound call: an absent
/// inbound header is forwarded as an empty value so the backend decides.
pub fn forward_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if !is_request_stripped(name) {
            out.append(name.clone(), value.clone());
        }
    }
    if !out.contains_key(header::AUTHORIZATION) {
        out.insert(header::AUTHORIZATION, HeaderValue::from_static(""));
    }
    out
}

/// Headers to relay to the caller from a backend response.
pub fn relay_response_headers(backend: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(backend.len());
    for (name, value) in backend {
        if !is_response_stripped(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Whether a content type names JSON (`application/json`, `application/problem+json`, ...).
pub fn is_json_content_type(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|v| {
            let mime = v.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

pub fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Fill in a JSON content type when the backend omitted one but sent JSON.
pub fn infer_content_type(headers: &mut HeaderMap, body: &[u8]) {
    if headers.contains_key(header::CONTENT_TYPE) || body.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    if serde_json::from_slice::<serde_json::Value>(body).is_ok() {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
}
