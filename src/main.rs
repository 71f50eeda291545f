use tracing_subscriber::EnvFilter;

use backoffice_gateway::{config, gateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up BACKEND_API_URL, APP_ENV, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Fails fast when BACKEND_API_URL is missing or unusable
    let config = config::init()?;
    tracing::info!(
        environment = ?config.environment,
        backend = config.gateway.origin_base(),
        resources = ?config.gateway.resources,
        "Starting back-office gateway"
    );

    let state = gateway::AppState::new(config.clone())?;
    let app = gateway::app(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    tracing::info!("Gateway listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
