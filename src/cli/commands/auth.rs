use clap::Subcommand;
use serde_json::json;

use crate::cli::config::api_client;
use crate::cli::utils::{output_error, output_fields, output_success, prompt_password};
use crate::cli::OutputFormat;
use crate::guard::{GuardDecision, RouteGuard};

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login through the gateway")]
    Login {
        #[arg(help = "Email address")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Forget the stored session")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Show current user information")]
    Whoami,

    #[command(about = "Refresh the access token")]
    Refresh,

    #[command(about = "Run the route guard against the current session")]
    Check {
        #[arg(long = "role", help = "Allowed role (repeatable)")]
        roles: Vec<String>,
    },
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = api_client()?;
    let session = client.session();

    match cmd {
        AuthCommands::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };

            let user = client.login(&email, &password).await?;
            output_success(
                &output_format,
                &format!("Logged in as {} ({})", display_name(&user.email, &user.id), user.role.name),
                Some(json!({ "user": user })),
            )
        }
        AuthCommands::Logout => {
            session.logout()?;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => {
            let snapshot = session.snapshot();
            let user = snapshot.user.as_ref();
            output_fields(
                &output_format,
                "status",
                &[
                    ("gateway", client.base_url().to_string()),
                    ("authenticated", snapshot.is_authenticated.to_string()),
                    ("access_token", presence(snapshot.access_token.is_some())),
                    ("refresh_token", presence(snapshot.refresh_token.is_some())),
                    ("user", user.map(|u| display_name(&u.email, &u.id)).unwrap_or_default()),
                    ("role", user.map(|u| u.role.name.clone()).unwrap_or_default()),
                    (
                        "organization",
                        user.and_then(|u| u.organization_id.clone()).unwrap_or_default(),
                    ),
                    ("checked_at", chrono::Utc::now().to_rfc3339()),
                ],
            )
        }
        AuthCommands::Whoami => match session.load_me(&client).await? {
            Some(user) => match output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "user": user }))?);
                    Ok(())
                }
                OutputFormat::Text => output_fields(
                    &output_format,
                    "user",
                    &[
                        ("id", user.id.clone()),
                        ("email", user.email.clone()),
                        ("name", user.full_name.clone()),
                        ("role", user.role.name.clone()),
                        ("organization", user.organization_id.clone().unwrap_or_default()),
                        ("active", user.is_active.to_string()),
                    ],
                ),
            },
            None => Err(anyhow::anyhow!("Not logged in")),
        },
        AuthCommands::Refresh => {
            session.refresh(&client).await?;
            output_success(&output_format, "Access token refreshed", None)
        }
        AuthCommands::Check { roles } => {
            settle_session(&client).await;

            let mut guard = RouteGuard::new().allow_roles(roles);
            let decision = guard.evaluate(session);
            match denial(&decision) {
                None => output_success(
                    &output_format,
                    "Access granted",
                    Some(json!({ "decision": decision })),
                ),
                Some((message, code)) => {
                    output_error(&output_format, &message, Some(code))?;
                    Err(anyhow::anyhow!(message))
                }
            }
        }
    }
}

/// Why the guard refused, with the error code `auth check` reports.
fn denial(decision: &GuardDecision) -> Option<(String, &'static str)> {
    match decision {
        GuardDecision::Render => None,
        GuardDecision::Redirect(to) => Some((format!("Access denied, redirect to {}", to), "REDIRECT")),
        GuardDecision::Loading => Some((
            "Session still settling (no organization on user)".to_string(),
            "LOADING",
        )),
    }
}

/// Fill in the user when only a token is stored. Failures are reported, not fatal.
pub async fn settle_session(client: &crate::client::ApiClient) {
    if let Err(e) = client.session().load_me(client).await {
        tracing::warn!(error = %e, "Could not load current user");
    }
}

fn display_name(email: &str, id: &str) -> String {
    if email.is_empty() {
        id.to_string()
    } else {
        email.to_string()
    }
}

fn presence(present: bool) -> String {
    let label = if present { "present" } else { "absent" };
    label.to_string()
}
