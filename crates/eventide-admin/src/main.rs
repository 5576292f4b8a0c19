//! eventide-admin entry point.

use std::error::Error;
use std::io;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use eventide_admin::cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "parsed arguments");

    let stdout = io::stdout();
    eventide_admin::run(cli, &mut stdout.lock()).await?;

    Ok(())
}
