use clap::Subcommand;
use serde_json::json;
use url::Url;

use crate::cli::config::{check_gateway, load_settings, resolve_gateway_url, save_settings, GatewayStatus};
use crate::cli::utils::{output_error, output_fields, output_success, output_value};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Point the CLI at a gateway")]
    Use {
        #[arg(help = "Gateway URL, e.g. http://localhost:3000")]
        url: String,
    },

    #[command(about = "Show the gateway currently in use")]
    Current,

    #[command(about = "Check gateway and backend health via /health")]
    Health,
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Use { url } => {
            let url = normalize_gateway_url(&url)?;
            let mut settings = load_settings()?;
            settings.set_gateway_url(url.clone());
            save_settings(&settings)?;

            output_success(
                &output_format,
                &format!("Switched to gateway '{}'", url),
                Some(json!({ "gateway_url": url })),
            )
        }
        ServerCommands::Current => {
            let settings = load_settings()?;
            let source = if std::env::var("BACKOFFICE_GATEWAY_URL").is_ok() {
                "environment"
            } else if settings.gateway_url.is_some() {
                "settings"
            } else {
                "default"
            };

            output_fields(
                &output_format,
                "current_gateway",
                &[
                    ("url", resolve_gateway_url(&settings)),
                    ("source", source.to_string()),
                    (
                        "updated_at",
                        settings.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    ),
                ],
            )
        }
        ServerCommands::Health => {
            let url = resolve_gateway_url(&load_settings()?);
            let (status, body) = check_gateway(&url).await;

            match (status, body) {
                (GatewayStatus::Up, Some(body)) => output_value(&output_format, &body),
                (GatewayStatus::Up, None) => output_success(&output_format, &format!("{} is up", url), None),
                (GatewayStatus::Degraded, body) => {
                    if let Some(body) = body {
                        output_value(&output_format, &body)?;
                    }
                    Err(anyhow::anyhow!("Gateway {} reports a degraded backend", url))
                }
                (GatewayStatus::Down, _) => {
                    output_error(&output_format, &format!("Gateway {} is unreachable", url), Some("DOWN"))?;
                    Err(anyhow::anyhow!("Gateway {} is unreachable", url))
                }
            }
        }
    }
}

fn normalize_gateway_url(raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid gateway URL '{}': {}", raw, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow::anyhow!("Gateway URL must use http or https: {}", raw));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
