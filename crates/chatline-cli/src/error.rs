//! Error handling for the Chatline CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Chat error: {0}")]
    Core(#[from] chatline_core::ChatError),

    #[error("Supabase error: {0}")]
    Supabase(#[from] chatline_supabase::SupabaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{action} rejected: {reason}")]
    Rejected { action: &'static str, reason: String },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

