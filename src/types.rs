//! Shared types used across the codebase

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform failure shape returned by the gateway and understood by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }

    /// Read a failed response body as an envelope.
    ///
    /// Backends answer failures in several shapes (`{error}`, `{message}`,
    /// `{error: true, message}`, plain text). The `error` string falls back
    /// from the body's `error` string to its `message` string to the HTTP
    /// reason phrase.
    pub fn from_response_body(status: u16, body: &[u8]) -> Self {
        let reason = canonical_reason(status);

        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        if let Some(Value::Object(obj)) = parsed {
            let error = obj.get("error").and_then(Value::as_str).map(str::to_string);
            let message = obj.get("message").and_then(Value::as_str).map(str::to_string);

            return match (error, message) {
                (Some(error), message) => Self { error, message },
                (None, Some(message)) => Self::with_message(message.clone(), message),
                (None, None) => Self::new(reason),
            };
        }

        let text = String::from_utf8_lossy(body).trim().to_string();
        if text.is_empty() {
            Self::new(reason)
        } else {
            Self::with_message(reason, text)
        }
    }

    /// Single line for logs and terminal output.
    pub fn display_message(&self) -> String {
        match &self.message {
            Some(message) if message != &self.error => format!("{}: {}", self.error, message),
            _ => self.error.clone(),
        }
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_message())
    }
}

fn canonical_reason(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Request failed")
        .to_string()
}
