//! Chatline CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatline_cli::{
    app::ChatApp,
    cli::{Cli, Commands},
    commands::CommandDispatcher,
    config::AppConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    // Printing the example must work before any configuration exists
    if matches!(cli.command, Commands::Config) {
        println!("{}", AppConfig::example_config());
        return Ok(());
    }

    let config = load_configuration(&cli).context("Could not load configuration")?;
    let app = ChatApp::new(config).context("Could not set up the Supabase client")?;

    if let Err(e) = CommandDispatcher::execute(cli, app).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` takes precedence
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load the layered configuration, with `--config` on top
fn load_configuration(cli: &Cli) -> anyhow::Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
    }
    let config = AppConfig::load(cli.config.as_deref().map(std::path::Path::new))?;
    Ok(config)
}
