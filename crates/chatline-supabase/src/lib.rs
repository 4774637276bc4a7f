//! Chatline Supabase adapters
//!
//! Implements the core collaborator traits against a hosted Supabase project:
//! PostgREST for the `messages` table, GoTrue for passwordless email login and
//! Realtime for the push feed.

pub mod auth;
pub mod config;
pub mod error;
mod http;
pub mod realtime;
pub mod rest;
pub mod session_store;

use std::sync::Arc;

use chatline_core::{AuthProvider, MessageRepository, PushFeed};

pub use auth::GoTrueClient;
pub use config::SupabaseConfig;
pub use error::{SupabaseError, SupabaseResult};
pub use realtime::{decode_change, PhoenixFrame, RealtimeFeed};
pub use rest::PostgrestClient;
pub use session_store::{AuthUser, SessionStore, StoredSession};

/// The three adapters for one project, sharing one session
#[derive(Clone)]
pub struct SupabaseBackend {
    pub rest: Arc<PostgrestClient>,
    pub auth: Arc<GoTrueClient>,
    pub realtime: Arc<RealtimeFeed>,
}

impl SupabaseBackend {
    pub fn new(config: &SupabaseConfig, feed_buffer_size: usize) -> SupabaseResult<Self> {
        config.validate()?;

        let sessions = match &config.session_file {
            Some(path) => SessionStore::load(path),
            None => SessionStore::in_memory(),
        };

        Ok(Self {
            rest: Arc::new(PostgrestClient::new(config, sessions.clone())?),
            auth: Arc::new(GoTrueClient::new(config, sessions.clone())?),
            realtime: Arc::new(RealtimeFeed::new(config, sessions, feed_buffer_size)),
        })
    }

    pub fn collaborators(
        &self,
    ) -> (
        Arc<dyn MessageRepository>,
        Arc<dyn PushFeed>,
        Arc<dyn AuthProvider>,
    ) {
        (
            self.rest.clone(),
            self.realtime.clone(),
            self.auth.clone(),
        )
    }
}
