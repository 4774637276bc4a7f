//! Chatline CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Built-in defaults
//! - `chatline.toml` in the working directory
//! - `~/.config/chatline/config.toml`
//! - Environment variables (`CHATLINE_SUPABASE__URL`, ...)
//! - A file passed with `--config`

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use chatline_core::{AdminPolicyConfig, ChannelConfig, ControllerConfig, CoreConfig, FeedConfig};
use chatline_supabase::SupabaseConfig;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the Chatline CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Supabase project connection
    pub supabase: SupabaseConfig,
    /// Who may delete messages
    pub admin: AdminPolicyConfig,
    /// Controller behavior
    pub controller: ControllerConfig,
    /// Channel buffer sizes
    pub channels: ChannelConfig,
    /// Terminal presentation
    pub cli: CliConfig,
}

/// Terminal presentation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Prompt shown in chat mode
    pub prompt: String,
    /// Show message timestamps
    pub show_timestamps: bool,
    /// Show message ids (needed to delete)
    pub show_ids: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            show_timestamps: true,
            show_ids: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load the layered configuration, with `explicit` on top if given
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("chatline.toml"));

        if let Some(path) = Self::default_config_path() {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("CHATLINE_").split("__"));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Loading(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::extract(figment)
    }

    /// Load defaults overlaid with one file only
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        if config.supabase.session_file.is_none() {
            config.supabase.session_file = Self::default_session_path();
        }

        config.validate()?;
        Ok(config)
    }

    /// `~/.config/chatline/config.toml` (platform equivalent)
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatline").join("config.toml"))
    }

    /// Where the login session is kept unless configured otherwise
    pub fn default_session_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("chatline").join("session.json"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.supabase
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        self.core_config()
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        if self.admin.allowlist.iter().any(|admin| admin.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "Admin allow-list contains an empty identity".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for the core controller
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            admin: self.admin.clone(),
            channels: self.channels.clone(),
            feed: FeedConfig {
                schema: self.supabase.schema.clone(),
                table: self.supabase.table.clone(),
            },
            controller: self.controller.clone(),
        }
    }

    /// Example configuration file content
    pub fn example_config() -> String {
        let example = AppConfig {
            supabase: SupabaseConfig {
                redirect_to: Some("https://chat.example.com".to_string()),
                ..SupabaseConfig::new("https://your-project.supabase.co", "your-anon-key")
            },
            admin: AdminPolicyConfig::with_admins(["admin@example.com"]),
            ..Default::default()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
