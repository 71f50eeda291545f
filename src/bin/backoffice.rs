use clap::Parser;
use tracing_subscriber::EnvFilter;

use backoffice_gateway::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Quiet by default so command output stays clean; RUST_LOG turns it up
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = backoffice_gateway::cli::run(cli).await {
        match std::env::var("CLI_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
