//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Join the room: live messages, type to send
    Chat,
    /// Print the message history and exit
    History {
        /// Only print the most recent messages
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Send a single message and exit
    Send {
        /// Message content
        message: String,
    },
    /// Delete a message (administrators only)
    Delete {
        /// Message id
        id: String,
    },
    /// Email a login link and code
    Login {
        email: String,
    },
    /// Complete login with the emailed code
    Verify {
        email: String,
        code: String,
    },
    /// End the current session
    Logout,
    /// Show the current session
    Whoami,
    /// Print an example configuration file
    Config,
}
