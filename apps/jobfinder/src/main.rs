mod cli;
mod config;
mod enrichment;
mod errors;
mod llm_client;
mod logging;
mod models;
mod notifications;
mod pipeline;
mod providers;
mod roles;
mod search;
mod sheets;
mod state;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use crate::cli::Cli;
use crate::config::Config;
use crate::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging depends on config, so config errors go straight to stderr.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return errors::AppError::Config(format!("{e:#}")).exit_code();
        }
    };

    init_logging(&config.log_level, config.log_format);
    info!("Starting jobfinder v{}", env!("CARGO_PKG_VERSION"));

    match cli::dispatch(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "jobfinder failed");
            e.exit_code()
        }
    }
}
