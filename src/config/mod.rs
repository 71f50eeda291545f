use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use url::Url;

/// Resources the gateway forwards when `GATEWAY_RESOURCES` is not set.
pub const DEFAULT_RESOURCES: &[&str] = &[
    "auth",
    "users",
    "roles",
    "organizations",
    "works",
    "suppliers",
    "employees",
    "payroll",
    "cashboxes",
    "documents",
    "audit",
    "dashboard",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub backend_origin: Url,
    /// Allowed first path segments under `/api`. `*` allows any.
    pub resources: Vec<String>,
    pub max_request_size_bytes: usize,
    pub health_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BACKEND_API_URL is not set; the gateway has no backend origin to forward to")]
    MissingBackendOrigin,

    #[error("BACKEND_API_URL '{value}' is invalid: {reason}")]
    InvalidBackendOrigin { value: String, reason: String },
}

impl AppConfig {
    /// Build the configuration from the process environment.
    ///
    /// Fails when the backend origin is missing or malformed instead of
    /// silently pointing the gateway at a default host.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let raw_origin = env::var("BACKEND_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingBackendOrigin)?;
        let backend_origin = parse_backend_origin(&raw_origin)?;

        let config = match environment {
            Environment::Production => Self::production(backend_origin),
            Environment::Staging => Self::staging(backend_origin),
            Environment::Development => Self::development(backend_origin),
        };

        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("GATEWAY_BIND_HOST") {
            self.server.bind_host = v;
        }
        if let Some(port) = env::var("GATEWAY_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }

        // Gateway overrides
        if let Ok(v) = env::var("GATEWAY_RESOURCES") {
            let resources = split_list(&v);
            if !resources.is_empty() {
                self.gateway.resources = resources;
            }
        }
        if let Ok(v) = env::var("GATEWAY_MAX_REQUEST_SIZE_BYTES") {
            self.gateway.max_request_size_bytes = v.parse().unwrap_or(self.gateway.max_request_size_bytes);
        }
        if let Ok(v) = env::var("GATEWAY_HEALTH_TIMEOUT_SECS") {
            self.gateway.health_timeout_secs = v.parse().unwrap_or(self.gateway.health_timeout_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        self
    }

    pub fn development(backend_origin: Url) -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                bind_host: "127.0.0.1".to_string(),
                port: 3000,
            },
            gateway: GatewayConfig {
                backend_origin,
                resources: default_resources(),
                max_request_size_bytes: 25 * 1024 * 1024, // 25MB, document uploads
                health_timeout_secs: 5,
            },
            security: SecurityConfig {
                enable_cors: false,
                cors_origins: vec!["http://localhost:5173".to_string()],
            },
        }
    }

    pub fn staging(backend_origin: Url) -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                bind_host: "0.0.0.0".to_string(),
                port: 3000,
            },
            gateway: GatewayConfig {
                backend_origin,
                resources: default_resources(),
                max_request_size_bytes: 15 * 1024 * 1024,
                health_timeout_secs: 3,
            },
            security: SecurityConfig {
                enable_cors: false,
                cors_origins: Vec::new(),
            },
        }
    }

    pub fn production(backend_origin: Url) -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                bind_host: "0.0.0.0".to_string(),
                port: 3000,
            },
            gateway: GatewayConfig {
                backend_origin,
                resources: default_resources(),
                max_request_size_bytes: 10 * 1024 * 1024,
                health_timeout_secs: 2,
            },
            security: SecurityConfig {
                enable_cors: false,
                cors_origins: Vec::new(),
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_host, self.server.port)
    }
}

impl GatewayConfig {
    pub fn allows_resource(&self, resource: &str) -> bool {
        !resource.is_empty() && self.resources.iter().any(|r| r == "*" || r == resource)
    }

    /// Backend origin as a string with no trailing slash, ready for path joins.
    pub fn origin_base(&self) -> &str {
        self.backend_origin.as_str().trim_end_matches('/')
    }
}

/// Validate an origin string: must be an absolute http(s) URL with a host.
pub fn parse_backend_origin(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBackendOrigin {
        value: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("origin must not carry a query or fragment".to_string()));
    }
    Ok(url)
}

fn default_resources() -> Vec<String> {
    DEFAULT_RESOURCES.iter().map(|s| s.to_string()).collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global config - set once at startup by the gateway binary
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// Load the configuration from the environment and install it globally.
/// Later calls return the already-installed value.
pub fn init() -> Result<&'static AppConfig, ConfigError> {
    CONFIG.get_or_try_init(AppConfig::from_env)
}
