use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::session::{FileStorage, SessionStore};

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub gateway_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Up,
    Degraded,
    Down,
}

impl Settings {
    pub fn set_gateway_url(&mut self, url: String) {
        self.gateway_url = Some(url);
        self.updated_at = Some(Utc::now());
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("BACKOFFICE_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("backoffice").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let settings_file = get_config_dir()?.join("settings.json");

    if !settings_file.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(settings_file)?;
    let settings: Settings = serde_json::from_str(&content)?;
    Ok(settings)
}

pub fn save_settings(settings: &Settings) -> anyhow::Result<()> {
    let settings_file = get_config_dir()?.join("settings.json");

    let content = serde_json::to_string_pretty(settings)?;
    fs::write(settings_file, content)?;
    Ok(())
}

/// `BACKOFFICE_GATEWAY_URL` wins over the saved setting, which wins over the default.
pub fn resolve_gateway_url(settings: &Settings) -> String {
    std::env::var("BACKOFFICE_GATEWAY_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .or_else(|| settings.gateway_url.clone())
        .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string())
}

/// Session backed by one file per storage key in the config directory.
pub fn open_session() -> anyhow::Result<SessionStore> {
    let storage = FileStorage::new(get_config_dir()?)?;
    Ok(SessionStore::init(Arc::new(storage)))
}

pub fn api_client() -> anyhow::Result<ApiClient> {
    let gateway_url = resolve_gateway_url(&load_settings()?);
    let session = open_session()?;
    Ok(ApiClient::new(gateway_url, session)?)
}

pub async fn check_gateway(gateway_url: &str) -> (GatewayStatus, Option<serde_json::Value>) {
    let client = reqwest::Client::new();
    let url = format!("{}/health", gateway_url.trim_end_matches('/'));

    match client.get(&url).timeout(Duration::from_secs(5)).send().await {
        Ok(response) => {
            let status = if response.status().is_success() {
                GatewayStatus::Up
            } else {
                GatewayStatus::Degraded
            };
            let body = response.json::<serde_json::Value>().await.ok();
            (status, body)
        }
        Err(e) => {
            tracing::debug!(error = %e, url, "Gateway health check failed");
            (GatewayStatus::Down, None)
        }
    }
}
