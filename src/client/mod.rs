//! Data-access client for the gateway.
//!
//! Every call carries the session's access token. A 401 triggers at most
//! one token refresh followed by one retry of the same call.

pub mod state;

use async_trait::async_trait;
use reqwest::{header, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::session::{AuthBackend, RawUser, SessionError, SessionStore, TokenPair, User};
use crate::types::ErrorEnvelope;
pub use state::FetchState;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const ME_PATH: &str = "/api/auth/me";
pub const REFRESH_PATH: &str = "/api/auth/refresh";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{envelope} (HTTP {status})")]
    Api { status: u16, envelope: ErrorEnvelope },

    #[error("failed to reach gateway: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            ClientError::Api { envelope, .. } => envelope.clone(),
            ClientError::Transport(e) => ErrorEnvelope::with_message("Failed to reach backend", e.to_string()),
            ClientError::Decode(detail) => ErrorEnvelope::with_message("Invalid response", detail.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_http(http, base_url, session))
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>, session: SessionStore) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request(Method::POST, path, Some(encode(body)?)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request(Method::PUT, path, Some(encode(body)?)).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request(Method::PATCH, path, Some(encode(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Same as [`get`](Self::get), folded into a [`FetchState`].
    pub async fn fetch<T: DeserializeOwned>(&self, path: &str) -> FetchState<T> {
        self.get(path).await.into()
    }

    /// Authenticated call with a single refresh-and-retry on 401.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        let token = self.session.access_token();
        let first = self
            .send(method.clone(), path, body.as_ref(), token.as_deref())
            .await;

        let original = match first {
            Err(e) if e.is_unauthorized() && self.session.refresh_token().is_some() => e,
            other => return other.and_then(|bytes| decode(&bytes)),
        };

        tracing::debug!(path, "Got 401, refreshing access token once");
        if let Err(e) = self.session.refresh(self).await {
            tracing::debug!(error = %e, "Refresh failed; returning original 401");
            return Err(original);
        }

        let token = self.session.access_token();
        let bytes = self.send(method, path, body.as_ref(), token.as_deref()).await?;
        decode(&bytes)
    }

    /// Exchange credentials for tokens and store them in the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let payload = json!({ "email": email, "password": password });
        let bytes = self
            .send(Method::POST, LOGIN_PATH, Some(&payload), None)
            .await?;
        let body: Value = decode(&bytes)?;
        let body = unwrap_data(&body);

        let tokens = token_pair(body)?;
        let raw_user = match body.get("user") {
            Some(user) if !user.is_null() => raw_user(user.clone())?,
            _ => self.fetch_current_user(&tokens.access_token).await?,
        };

        self.session
            .login(raw_user, tokens.access_token, tokens.refresh_token)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?.to_vec();

        if status.is_success() || status.is_redirection() {
            return Ok(bytes);
        }

        let envelope = ErrorEnvelope::from_response_body(status.as_u16(), &bytes);
        tracing::debug!(%method, path, status = status.as_u16(), error = %envelope, "Request failed");
        Err(ClientError::Api {
            status: status.as_u16(),
            envelope,
        })
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn fetch_current_user(&self, access_token: &str) -> Result<RawUser, ClientError> {
        let bytes = self.send(Method::GET, ME_PATH, None, Some(access_token)).await?;
        let body: Value = decode(&bytes)?;
        let body = unwrap_data(&body);
        let user = body.get("user").filter(|u| u.is_object()).unwrap_or(body);
        raw_user(user.clone())
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let payload = json!({ "refreshToken": refresh_token });
        let bytes = self
            .send(Method::POST, REFRESH_PATH, Some(&payload), None)
            .await?;
        let body: Value = decode(&bytes)?;
        token_pair(unwrap_data(&body))
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// An empty success body decodes as JSON `null`.
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ClientError> {
    let bytes = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        bytes
    };
    serde_json::from_slice(bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

/// `{data: {...}}` envelopes wrap the payload the caller actually wants.
fn unwrap_data(body: &Value) -> &Value {
    match body.get("data") {
        Some(data) if data.is_object() => data,
        _ => body,
    }
}

fn raw_user(value: Value) -> Result<RawUser, ClientError> {
    RawUser::from_value(value).map_err(|e| ClientError::Decode(format!("user record: {}", e)))
}

fn token_pair(body: &Value) -> Result<TokenPair, ClientError> {
    let access_token = first_str(body, &["accessToken", "access_token", "token"])
        .ok_or_else(|| ClientError::Decode("response carried no access token".to_string()))?;
    let refresh_token = first_str(body, &["refreshToken", "refresh_token"]);

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn first_str(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
