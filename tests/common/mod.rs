#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use url::Url;

use backoffice_gateway::config::AppConfig;
use backoffice_gateway::gateway::{self, AppState};

/// A request as the mock backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> Response + Send + Sync>;

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Responder,
}

/// Stand-in for the real backend API: records every call and answers with `responder`.
pub struct MockBackend {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub async fn start<F>(responder: F) -> Result<Self>
    where
        F: Fn(&RecordedRequest) -> Response + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            requests: requests.clone(),
            responder: Arc::new(responder),
        };
        let router = Router::new().fallback(record).with_state(state);
        let base_url = serve(router).await?;

        Ok(Self { base_url, requests })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path() == path).collect()
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method,
        uri: uri.to_string(),
        headers,
        body: body.to_vec(),
    };
    let response = (state.responder)(&request);
    state.requests.lock().unwrap().push(request);
    response
}

pub struct TestGateway {
    pub base_url: String,
}

pub async fn start_gateway(backend_url: &str) -> Result<TestGateway> {
    let config = AppConfig::development(Url::parse(backend_url)?);
    start_gateway_with(config).await
}

pub async fn start_gateway_with(config: AppConfig) -> Result<TestGateway> {
    let state = AppState::new(config)?;
    let base_url = serve(gateway::app(state)).await?;
    Ok(TestGateway { base_url })
}

/// Bind on a free port and serve in the background of the current test runtime.
async fn serve(router: Router) -> Result<String> {
    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok(format!("http://{}", addr))
}

/// An origin nothing listens on.
pub fn dead_origin() -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    Ok(format!("http://127.0.0.1:{}", port))
}

pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, axum::Json(body)).into_response()
}

/// Body with no content-type header at all.
pub fn bare_response(status: StatusCode, body: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

/// Client that never follows redirects, so 3xx answers can be inspected.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
