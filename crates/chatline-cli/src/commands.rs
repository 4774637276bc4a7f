//! Command handlers for the Chatline CLI

use tracing::info;

use crate::app::ChatApp;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, app: ChatApp) -> Result<()> {
        match cli.command {
            Commands::Chat => app.run_chat().await,
            Commands::History { limit } => app.print_history(limit).await,
            Commands::Send { message } => app.send(&message).await,
            Commands::Delete { id } => app.delete(&id).await,
            Commands::Login { email } => app.login(&email).await,
            Commands::Verify { email, code } => {
                let session = app.verify(&email, &code).await?;
                info!(session = %session, "Login completed");
                println!("Logged in as {}", session);
                Ok(())
            }
            Commands::Logout => app.logout().await,
            Commands::Whoami => app.whoami().await,
            Commands::Config => {
                println!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }
}
