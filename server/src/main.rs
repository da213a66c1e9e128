// server/src/main.rs

// This is the main entry point for the billing engine daemon.
// It handles command-line argument parsing and dispatches to the CLI logic.

use anyhow::Result;
use rpmbill_server::cli::start_cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    start_cli().await
}
