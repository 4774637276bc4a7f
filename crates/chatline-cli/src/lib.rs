//! Chatline CLI
//!
//! Terminal client for a shared chat room hosted on Supabase.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;

pub use app::ChatApp;
pub use config::{AppConfig, CliConfig, ConfigError};
pub use error::{CliError, Result};
