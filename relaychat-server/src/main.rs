//! Main entry point for the Relaychat server CLI.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use relaychat_shared::config::Config;
use std::error::Error;
use std::path::PathBuf;

mod app_state;
mod handlers;
mod http;
mod hub;
mod middleware;
mod openapi;
mod routes;
mod server;
mod services;

#[cfg(test)]
mod api_contract_tests;

/// Main CLI structure for the Relaychat server.
#[derive(Parser)]
#[command(name = "Relaychat CLI")]
#[command(about = "Backend server for Relaychat", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for the Relaychat CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the backend server
    Serve {
        /// The port number to bind the server to (e.g., 8080). Example usage: `--port 8080`
        #[arg(
            long,
            short,
            help = "The port number to bind the server to (e.g., 8080). Example usage: `--port 8080`"
        )]
        port: u16,

        /// Path to the configuration file (optional)
        #[arg(
            long,
            short,
            help = "Path to the configuration file (e.g., config.json). If not provided, defaults will be used."
        )]
        config: Option<PathBuf>,
    },
}

/// Initializes environment variables and returns the parsed CLI.
#[must_use]
pub fn initialize_cli() -> Cli {
    dotenv().ok();
    Cli::parse()
}

/// Handles the serve command by loading configuration and starting the server.
///
/// # Errors
/// Returns an error if configuration loading or server startup fails.
pub async fn handle_serve_command(
    port: u16,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let resolved_config =
        Config::load(config, Some(port)).map_err(|err| -> Box<dyn Error> { Box::new(err) })?;
    server::run(resolved_config).await
}

/// Main application entry point.
///
/// # Errors
/// Returns an error if the application fails to initialize or run.
pub async fn run_app() -> Result<(), Box<dyn Error>> {
    let cli = initialize_cli();

    match cli.command {
        Commands::Serve { port, config } => {
            handle_serve_command(port, config).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    run_app().await
}
