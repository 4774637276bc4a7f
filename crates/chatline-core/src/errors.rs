//! Error types for the Chatline core
//!
//! This module contains the error taxonomy shared by every component: transport
//! failures reported by external collaborators, malformed feed events, lifecycle
//! misuse and authorization rejections, unified under [`ChatError`].

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Bulk read of messages failed: {reason}")]
    BulkReadFailed { reason: String },
    #[error("Inserting message failed: {reason}")]
    InsertFailed { reason: String },
    #[error("Deleting message {id} failed: {reason}")]
    DeleteFailed { id: String, reason: String },
    #[error("Login link request for {email} failed: {reason}")]
    LoginRequestFailed { email: String, reason: String },
    #[error("Session query failed: {reason}")]
    SessionQueryFailed { reason: String },
    #[error("Logout failed: {reason}")]
    LogoutFailed { reason: String },
    #[error("Opening push feed failed: {reason}")]
    FeedOpenFailed { reason: String },
    #[error("Push feed closed: {reason}")]
    FeedClosed { reason: String },
}

/// Channel failures between the controller loop and its callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel buffer is full")]
    ChannelFull,
    #[error("Channel is closed")]
    ChannelClosed,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the Chatline client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed event: {reason}")]
    MalformedEvent { reason: String },

    #[error("Invalid state for {component}: expected {expected}, got {actual}")]
    InvalidState {
        component: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Identity {identity} is not authorized for this action")]
    Unauthorized { identity: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl ChatError {
    /// Create a malformed event error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error for a component
    pub fn invalid_state(
        component: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            component,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the error came from an external collaborator
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type ChatResult<T> = core::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::from(TransportError::DeleteFailed {
            id: "2".to_string(),
            reason: "HTTP 500".to_string(),
        });
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "Transport failure: Deleting message 2 failed: HTTP 500"
        );

        let err = ChatError::invalid_state("MessageStore", "unmutated store", "3 mutations");
        assert_eq!(
            err.to_string(),
            "Invalid state for MessageStore: expected unmutated store, got 3 mutations"
        );
    }
}
