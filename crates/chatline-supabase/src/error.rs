//! Supabase adapter errors

use chatline_core::{ChatError, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned {status} ({body_summary})")]
    Status {
        operation: &'static str,
        status: u16,
        body_summary: String,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Realtime channel join rejected: {0}")]
    JoinRejected(String),

    #[error("No confirmed session")]
    NotAuthenticated,
}

impl SupabaseError {
    /// HTTP status code, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The session is missing, expired or revoked
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::NotAuthenticated) || matches!(self.status(), Some(401 | 403))
    }
}

/// Wrap an adapter error as the transport failure of a specific operation
pub(crate) fn transport(e: SupabaseError, build: impl FnOnce(String) -> TransportError) -> ChatError {
    match e {
        SupabaseError::Configuration(reason) => ChatError::configuration(reason),
        other => ChatError::Transport(build(other.to_string())),
    }
}

pub type SupabaseResult<T> = Result<T, SupabaseError>;
