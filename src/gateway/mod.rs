//! Gateway HTTP surface: forwards `/api/*` calls to the backend origin.

pub mod headers;
pub mod proxy;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{any, get},
    Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, SecurityConfig};
use crate::error::GatewayError;

/// Shared, read-only state for every gateway request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, reqwest::Error> {
        // Redirects are the caller's business; relay them instead of following
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

/// Build the gateway router.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.gateway.max_request_size_bytes;
    let cors = cors_layer(&state.config.security);

    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Proxied backend resources
        .merge(api_routes())
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Everything under `/api/`; the handler picks the resource out of the raw path.
fn api_routes() -> Router<AppState> {
    Router::new().route("/api/*path", any(proxy::forward))
}

/// CORS is off unless explicitly enabled with a list of origins.
fn cors_layer(security: &SecurityConfig) -> Option<CorsLayer> {
    if !security.enable_cors {
        return None;
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Back-office API gateway",
            "version": version,
            "environment": state.config.environment,
            "backend": state.config.gateway.origin_base(),
            "resources": state.config.gateway.resources,
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "api": "/api/<resource>[/...] (forwarded to the backend)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let timeout = Duration::from_secs(state.config.gateway.health_timeout_secs);

    match state
        .client
        .get(state.config.gateway.backend_origin.clone())
        .timeout(timeout)
        .send()
        .await
    {
        // Any HTTP answer means the origin is reachable
        Ok(response) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "backend": "reachable",
                    "backend_status": response.status().as_u16(),
                }
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Backend health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "backend unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "backend_error": e.to_string(),
                    }
                })),
            )
        }
    }
}

async fn not_found() -> GatewayError {
    GatewayError::not_found("No route matches this path")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use tower::ServiceExt; // for `oneshot`
    use url::Url;

    fn test_app(origin: &str) -> Router {
        let config = AppConfig::development(Url::parse(origin).unwrap());
        app(AppState::new(config).unwrap())
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn empty_post_body_rejected_without_backend() {
        // Nothing listens on port 9; reaching it would turn this into a 500
        let response = test_app("http://127.0.0.1:9")
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/works")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Request body is required");
    }

    #[tokio::test]
    async fn malformed_patch_body_rejected() {
        let response = test_app("http://127.0.0.1:9")
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/api/suppliers/7")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"name\": "))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn unknown_resource_is_404() {
        let response = test_app("http://127.0.0.1:9")
            .oneshot(
                Request::builder()
                    .uri("/api/secrets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn unreachable_backend_is_500_envelope() {
        let response = test_app("http://127.0.0.1:9")
            .oneshot(
                Request::builder()
                    .uri("/api/works")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Failed to reach backend");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn oversized_body_is_413_envelope() {
        let mut config = AppConfig::development(Url::parse("http://127.0.0.1:9").unwrap());
        config.gateway.max_request_size_bytes = 16;
        let response = app(AppState::new(config).unwrap())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/works")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"notes":"far more than sixteen bytes"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Request body too large");
    }

    #[tokio::test]
    async fn bare_api_prefix_is_404_envelope() {
        let response = test_app("http://127.0.0.1:9")
            .oneshot(Request::builder().uri("/api/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn root_lists_resources() {
        let response = test_app("http://127.0.0.1:9")
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert!(body["data"]["resources"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r == "payroll"));
    }
}
