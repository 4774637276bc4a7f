//! In-memory backend configuration

use chatline_core::FeedConfig;

/// Behavior of the in-memory backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Schema and table the backend reports changes for
    pub feed: FeedConfig,
    /// Buffer size of each opened feed handle
    pub feed_buffer_size: usize,
    /// Broadcast inserts and deletes to open feeds, like a real change feed
    pub broadcast_writes: bool,
    /// Return the created row from inserts
    pub return_created_rows: bool,
    /// Timestamp assigned to the first inserted row, in microseconds
    pub clock_start_micros: i64,
    /// Increment between assigned timestamps, in microseconds
    pub clock_step_micros: i64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            feed_buffer_size: 256,
            broadcast_writes: true,
            return_created_rows: true,
            clock_start_micros: 1_700_000_000_000_000,
            clock_step_micros: 1_000,
        }
    }
}

impl BackendConfig {
    /// Writes are acknowledged but never pushed; tests deliver changes by hand
    pub fn manual_feed() -> Self {
        Self {
            broadcast_writes: false,
            ..Self::default()
        }
    }

    /// Inserts return nothing, like a store that only acknowledges writes
    pub fn write_only() -> Self {
        Self {
            return_created_rows: false,
            ..Self::default()
        }
    }
}
