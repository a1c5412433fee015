//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::{Context, Result};
use args::{Cli, Commands};
use clap::Parser;
use rpz_srv::ServerConfig;

use crate::logging;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(&cli.log_level)?;

    let config = ServerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command.unwrap_or_default() {
        Commands::Serve(args) => commands::serve::execute(config, args).await,
        Commands::CheckConfig => commands::check::execute(&config),
    }
}
