//! Mente Sã - mental-health support chat CLI
//!
#![doc = "Mente Sã - mental-health support chat CLI"]
#![doc = "Main entry point for the Mente Sã terminal application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mentesa::cli::{Cli, Commands};
use mentesa::commands;
use mentesa::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(cli.verbose, config.logging.json);
    tracing::debug!("Loaded configuration from {}", config_path);

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { new } => {
            if new {
                tracing::debug!("Starting on a new conversation");
            }
            commands::chat::run_chat(config, new).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(&config, command).await?;
            Ok(())
        }
        Commands::Auth { command } => {
            tracing::info!("Starting account command");
            commands::auth::handle_auth(&config, command).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so they do not interleave with the chat transcript.
fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "mentesa=debug" } else { "mentesa=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
