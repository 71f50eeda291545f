// Gateway error types
use axum::{extract::rejection::BytesRejection, http::StatusCode, response::IntoResponse, Json};

use crate::types::ErrorEnvelope;

/// Failures the gateway produces itself, as opposed to backend rejections
/// which are relayed untouched.
#[derive(Debug)]
pub enum GatewayError {
    // 400 Bad Request
    BodyRequired,
    InvalidJson(String),

    // 400 Bad Request, body could not be read at all
    UnreadableBody(String),

    // 404 Not Found
    NotFound(String),

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 500 Internal Server Error
    Transport(String),
    Internal(String),

    // 500, or the backend's own status when it was already a failure
    InvalidBackendResponse { status: StatusCode, raw: String },
}

impl GatewayError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BodyRequired => StatusCode::BAD_REQUEST,
            GatewayError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnreadableBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidBackendResponse { status, .. } => {
                if status.is_success() || status.is_redirection() || status.is_informational() {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    *status
                }
            }
        }
    }

    /// Short label placed in the envelope's `error` field
    pub fn error_label(&self) -> &'static str {
        match self {
            GatewayError::BodyRequired => "Request body is required",
            GatewayError::InvalidJson(_) => "Invalid JSON",
            GatewayError::UnreadableBody(_) => "Could not read request body",
            GatewayError::NotFound(_) => "Not found",
            GatewayError::PayloadTooLarge(_) => "Request body too large",
            GatewayError::Transport(_) => "Failed to reach backend",
            GatewayError::Internal(_) => "Internal server error",
            GatewayError::InvalidBackendResponse { .. } => "Invalid JSON response from backend",
        }
    }

    /// Optional detail placed in the envelope's `message` field
    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::BodyRequired => None,
            GatewayError::InvalidJson(msg) => Some(msg),
            GatewayError::UnreadableBody(msg) => Some(msg),
            GatewayError::NotFound(msg) => Some(msg),
            GatewayError::PayloadTooLarge(msg) => Some(msg),
            GatewayError::Transport(msg) => Some(msg),
            GatewayError::Internal(msg) => Some(msg),
            GatewayError::InvalidBackendResponse { raw, .. } => Some(raw),
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.error_label().to_string(),
            message: self.detail().map(str::to_string),
        }
    }
}

impl GatewayError {
    pub fn invalid_json(message: impl Into<String>) -> Self {
        GatewayError::InvalidJson(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        GatewayError::NotFound(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        GatewayError::Transport(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }

    pub fn invalid_backend_response(status: StatusCode, raw: impl Into<String>) -> Self {
        GatewayError::InvalidBackendResponse {
            status,
            raw: raw.into(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        // Log the full chain but hand the caller a generic envelope
        tracing::error!(error = ?err, "Backend request failed");
        GatewayError::transport(err.to_string())
    }
}

impl From<BytesRejection> for GatewayError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge(rejection.body_text())
        } else {
            GatewayError::UnreadableBody(rejection.body_text())
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {}", self.error_label(), detail),
            None => write!(f, "{}", self.error_label()),
        }
    }
}

impl std::error::Error for GatewayError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_required_has_no_message() {
        let err = GatewayError::BodyRequired;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_envelope(), ErrorEnvelope::new("Request body is required"));
    }

    #[test]
    fn transport_failure_is_500() {
        let err = GatewayError::transport("connection refused");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_envelope().message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn oversized_body_is_413_envelope() {
        let err = GatewayError::PayloadTooLarge("length limit exceeded".into());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            err.to_envelope(),
            ErrorEnvelope::with_message("Request body too large", "length limit exceeded")
        );
    }

    #[test]
    fn invalid_backend_response_keeps_failure_status() {
        let ok = GatewayError::invalid_backend_response(StatusCode::OK, "<html>");
        assert_eq!(ok.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let conflict = GatewayError::invalid_backend_response(StatusCode::CONFLICT, "{oops");
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(conflict.to_envelope().message.as_deref(), Some("{oops"));
    }
}
