//! External Collaborator Traits
//!
//! Defines the interfaces the core consumes from the remote store: bulk read,
//! row insert/delete, the push feed and the authentication service. Concrete
//! implementations live in their own crates (`chatline-supabase` for the hosted
//! backend, `chatline-harness` for in-memory testing).

use core::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::ChatResult;
use crate::types::{AuthorId, Message, MessageId, Session};

// ----------------------------------------------------------------------------
// Message Repository
// ----------------------------------------------------------------------------

/// Row-level access to the authoritative message collection
#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    /// Read every message, ordered by creation time ascending
    async fn list_messages(&self) -> ChatResult<Vec<Message>>;

    /// Insert a new message row
    ///
    /// Success does not imply the row is visible yet; it is expected to arrive
    /// through the push feed. Backends that can return the created row do so,
    /// and the controller may merge it early.
    async fn insert_message(&self, content: &str, author: &AuthorId)
        -> ChatResult<Option<Message>>;

    /// Delete the message row with the given identifier
    async fn delete_message(&self, id: &MessageId) -> ChatResult<()>;
}

// ----------------------------------------------------------------------------
// Authentication Provider
// ----------------------------------------------------------------------------

/// Passwordless login and session queries
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Ask the service to email a login link to `email`
    async fn request_login_link(&self, email: &str) -> ChatResult<()>;

    /// The session confirmed out of band, if any
    async fn current_session(&self) -> ChatResult<Option<Session>>;

    /// End the current session
    async fn logout(&self) -> ChatResult<()>;
}

// ----------------------------------------------------------------------------
// Push Feed
// ----------------------------------------------------------------------------

/// Kind of row change reported by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Other(String),
}

impl ChangeKind {
    /// Parse the change type reported by the backend (`INSERT`, `DELETE`, ...)
    pub fn parse(kind: &str) -> Self {
        match kind.to_ascii_uppercase().as_str() {
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other(kind.to_string()),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// A raw row change as delivered by the feed transport
///
/// Records are left undecoded so the subscriber can decide whether the change
/// is relevant and well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedChange {
    pub schema: String,
    pub table: String,
    pub kind: ChangeKind,
    /// New row for inserts and updates
    pub record: Option<serde_json::Value>,
    /// Old row (often only the primary key) for updates and deletes
    pub old_record: Option<serde_json::Value>,
}

impl FeedChange {
    pub fn insert(schema: &str, table: &str, record: serde_json::Value) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            kind: ChangeKind::Insert,
            record: Some(record),
            old_record: None,
        }
    }

    pub fn delete(schema: &str, table: &str, old_record: serde_json::Value) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            kind: ChangeKind::Delete,
            record: None,
            old_record: Some(old_record),
        }
    }
}

/// Identifier of one open feed subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning handle to an open feed
///
/// Changes are only observable through the handle's receiver, so once the
/// handle is closed nothing can be delivered through it.
#[derive(Debug)]
pub struct FeedHandle {
    id: SubscriptionId,
    receiver: mpsc::Receiver<FeedChange>,
}

impl FeedHandle {
    pub fn new(id: SubscriptionId, receiver: mpsc::Receiver<FeedChange>) -> Self {
        Self { id, receiver }
    }

    /// Create a handle together with the sender the transport feeds
    pub fn channel(buffer_size: usize) -> (mpsc::Sender<FeedChange>, Self) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        (sender, Self::new(SubscriptionId::new(), receiver))
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next change; `None` once the transport side has gone away
    pub async fn recv(&mut self) -> Option<FeedChange> {
        self.receiver.recv().await
    }

    /// Stop accepting changes; anything still buffered is discarded
    pub fn close_receiver(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}

/// A subscribable stream of row changes scoped to the message collection
#[async_trait::async_trait]
pub trait PushFeed: Send + Sync {
    /// Open the feed and return the handle changes arrive on
    async fn open(&self) -> ChatResult<FeedHandle>;

    /// Close a previously opened feed
    async fn close(&self, handle: FeedHandle) -> ChatResult<()>;
}
