//! Centralized Configuration Management
//!
//! This module consolidates the configuration structures used by the core
//! components so every front-end can load them from one place.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{ChatError, ChatResult};

// ----------------------------------------------------------------------------
// Admin Policy Configuration
// ----------------------------------------------------------------------------

/// Identities allowed to delete messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminPolicyConfig {
    /// Author identifiers considered administrators
    pub allowlist: BTreeSet<String>,
}

impl AdminPolicyConfig {
    /// Create a policy configuration from a list of identities
    pub fn with_admins<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowlist: admins.into_iter().map(Into::into).collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the channels around the controller loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for Command channels (UI → Controller)
    pub command_buffer_size: usize,
    /// Buffer size for AppEvent channels (Controller → UI)
    pub app_event_buffer_size: usize,
    /// Buffer size for raw feed changes (Transport → Subscriber)
    pub feed_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,   // User actions are infrequent
            app_event_buffer_size: 64, // UI updates need responsiveness
            feed_buffer_size: 256,     // Feed traffic can be bursty
        }
    }
}

impl ChannelConfig {
    /// Small buffers that surface backpressure quickly in tests
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 8,
            app_event_buffer_size: 16,
            feed_buffer_size: 16,
        }
    }

    pub fn validate(&self) -> ChatResult<()> {
        if self.command_buffer_size == 0
            || self.app_event_buffer_size == 0
            || self.feed_buffer_size == 0
        {
            return Err(ChatError::configuration(
                "channel buffer sizes must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Feed Configuration
// ----------------------------------------------------------------------------

/// Which collection the realtime subscriber listens to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Database schema holding the messages table
    pub schema: String,
    /// Messages table name
    pub table: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "messages".to_string(),
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> ChatResult<()> {
        if self.schema.trim().is_empty() || self.table.trim().is_empty() {
            return Err(ChatError::configuration(
                "feed schema and table must not be empty",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Controller Configuration
// ----------------------------------------------------------------------------

/// Behavior switches for the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Merge rows returned by a successful insert before the feed echoes them
    pub optimistic_echo: bool,
    /// Publish a full snapshot on every store change
    pub publish_snapshots: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            optimistic_echo: true,
            publish_snapshots: true,
        }
    }
}

impl ControllerConfig {
    /// Feed-only reconciliation, matching a backend that never returns rows
    pub fn feed_only() -> Self {
        Self {
            optimistic_echo: false,
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Aggregate Configuration
// ----------------------------------------------------------------------------

/// Everything the core needs, grouped for front-ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub admin: AdminPolicyConfig,
    pub channels: ChannelConfig,
    pub feed: FeedConfig,
    pub controller: ControllerConfig,
}

impl CoreConfig {
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            ..Self::default()
        }
    }

    pub fn with_admins<I, S>(mut self, admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin = AdminPolicyConfig::with_admins(admins);
        self
    }

    pub fn validate(&self) -> ChatResult<()> {
        self.channels.validate()?;
        self.feed.validate()
    }
}
