use clap::Subcommand;
use reqwest::Method;
use serde_json::Value;

use crate::cli::commands::auth::settle_session;
use crate::cli::config::api_client;
use crate::cli::utils::{output_value, read_stdin_json};
use crate::cli::OutputFormat;
use crate::client::ApiClient;
use crate::guard::{GuardDecision, RouteGuard};

#[derive(Subcommand)]
pub enum DataCommands {
    #[command(about = "List records, or fetch one by id")]
    Get {
        #[arg(help = "Resource name (works, suppliers, payroll, ...)")]
        resource: String,
        #[arg(help = "Record ID to retrieve (optional)")]
        id: Option<String>,
        #[arg(long, help = "Raw query string appended to the request")]
        query: Option<String>,
    },

    #[command(about = "Create record from stdin")]
    Create {
        #[arg(help = "Resource name")]
        resource: String,
    },

    #[command(about = "Update record from stdin")]
    Update {
        #[arg(help = "Resource name")]
        resource: String,
        #[arg(help = "Record ID to update")]
        id: String,
        #[arg(long, help = "Send PUT (full replacement) instead of PATCH")]
        replace: bool,
    },

    #[command(about = "Delete record")]
    Delete {
        #[arg(help = "Resource name")]
        resource: String,
        #[arg(help = "Record ID to delete")]
        id: String,
    },
}

pub async fn handle(cmd: DataCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = api_client()?;
    require_access(&client).await?;

    let value: Value = match cmd {
        DataCommands::Get { resource, id, query } => {
            let mut path = resource_path(&resource, id.as_deref());
            if let Some(query) = query.filter(|q| !q.is_empty()) {
                path.push('?');
                path.push_str(query.trim_start_matches('?'));
            }
            client.request(Method::GET, &path, None).await?
        }
        DataCommands::Create { resource } => {
            let body = read_stdin_json()?;
            client.post(&resource_path(&resource, None), &body).await?
        }
        DataCommands::Update { resource, id, replace } => {
            let body = read_stdin_json()?;
            let path = resource_path(&resource, Some(&id));
            if replace {
                client.put(&path, &body).await?
            } else {
                client.patch(&path, &body).await?
            }
        }
        DataCommands::Delete { resource, id } => client.delete(&resource_path(&resource, Some(&id))).await?,
    };

    output_value(&output_format, &value)
}

/// Data commands are protected views: run the guard before touching the gateway.
async fn require_access(client: &ApiClient) -> anyhow::Result<()> {
    settle_session(client).await;

    match RouteGuard::new().evaluate(client.session()) {
        GuardDecision::Render => Ok(()),
        GuardDecision::Redirect(to) if to == crate::guard::LOGIN_PATH => {
            Err(anyhow::anyhow!("Not logged in; run `backoffice auth login <email>` first"))
        }
        GuardDecision::Redirect(to) => Err(anyhow::anyhow!("Access denied (redirect to {})", to)),
        GuardDecision::Loading => Err(anyhow::anyhow!(
            "Session is still settling: the current user has no organization yet"
        )),
    }
}

pub fn resource_path(resource: &str, id: Option<&str>) -> String {
    let resource = resource.trim_matches('/');
    match id {
        Some(id) => format!("/api/{}/{}", resource, id.trim_matches('/')),
        None => format!("/api/{}", resource),
    }
}
