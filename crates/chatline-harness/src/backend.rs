//! In-memory Backend
//!
//! A deterministic stand-in for the hosted message store, its change feed and
//! the authentication service. It keeps rows in memory, assigns increasing ids
//! and timestamps, broadcasts writes to every open feed, records how often each
//! operation was called and can be told to fail any of them.

use std::collections::HashMap;
use std::sync::Arc;

use chatline_core::{
    AuthProvider, AuthorId, ChatResult, FeedChange, FeedHandle, Message, MessageId,
    MessageRepository, PushFeed, Session, SubscriptionId, Timestamp, TransportError,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::BackendConfig;

// ----------------------------------------------------------------------------
// Fault Injection
// ----------------------------------------------------------------------------

/// Which operations should fail
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub fail_bulk_read: bool,
    pub fail_insert: bool,
    pub fail_delete: bool,
    pub fail_login: bool,
    pub fail_session_query: bool,
    pub fail_logout: bool,
    pub fail_open: bool,
}

impl FaultPlan {
    /// Every external call fails
    pub fn outage() -> Self {
        Self {
            fail_bulk_read: true,
            fail_insert: true,
            fail_delete: true,
            fail_login: true,
            fail_session_query: true,
            fail_logout: true,
            fail_open: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Call Counters
// ----------------------------------------------------------------------------

/// How often each operation reached the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub bulk_reads: u64,
    pub inserts: u64,
    pub deletes: u64,
    pub login_requests: u64,
    pub session_queries: u64,
    pub logouts: u64,
    pub feeds_opened: u64,
    pub feeds_closed: u64,
    pub changes_delivered: u64,
}

// ----------------------------------------------------------------------------
// In-memory Backend
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BackendState {
    rows: Vec<Message>,
    next_id: u64,
    clock: i64,
    feeds: HashMap<SubscriptionId, mpsc::Sender<FeedChange>>,
    session: Option<Session>,
    requested_logins: Vec<String>,
    faults: FaultPlan,
    stats: BackendStats,
}

/// Shared in-memory backend; clones observe the same state
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    config: Arc<BackendConfig>,
    state: Arc<Mutex<BackendState>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

impl InMemoryBackend {
    pub fn new(config: BackendConfig) -> Self {
        let state = BackendState {
            next_id: 1,
            clock: config.clock_start_micros,
            ..BackendState::default()
        };
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Backend that already holds the given rows
    ///
    /// Rows are kept in the order given; `list_messages` sorts them.
    pub fn with_rows(config: BackendConfig, rows: Vec<Message>) -> Self {
        let next_id = rows
            .iter()
            .filter_map(|m| m.id.as_str().parse::<u64>().ok())
            .max()
            .map_or(1, |max| max + 1);
        let clock = rows
            .iter()
            .map(|m| m.created_at.as_micros() + config.clock_step_micros)
            .max()
            .unwrap_or(config.clock_start_micros)
            .max(config.clock_start_micros);

        let state = BackendState {
            rows,
            next_id,
            clock,
            ..BackendState::default()
        };
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// The same backend behind each collaborator trait
    pub fn collaborators(
        &self,
    ) -> (
        Arc<dyn MessageRepository>,
        Arc<dyn PushFeed>,
        Arc<dyn AuthProvider>,
    ) {
        let shared = Arc::new(self.clone());
        (shared.clone(), shared.clone(), shared)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Test Controls
    // ------------------------------------------------------------------------

    pub async fn set_faults(&self, faults: FaultPlan) {
        self.state.lock().await.faults = faults;
    }

    /// Set the session the auth service reports
    pub async fn set_session(&self, session: Option<Session>) {
        self.state.lock().await.session = session;
    }

    /// Simulate the user following the emailed link
    ///
    /// Returns `false` if no link was requested for this email.
    pub async fn confirm_login(&self, email: &str) -> bool {
        let mut state = self.state.lock().await;
        if !state.requested_logins.iter().any(|e| e == email) {
            return false;
        }
        state.session = Some(Session::authenticated(email));
        true
    }

    /// Another client writes a message
    pub async fn remote_insert(&self, content: &str, author: &str) -> Message {
        let mut state = self.state.lock().await;
        let message = self.create_row(&mut state, content, &AuthorId::from(author));
        self.broadcast_insert(&mut state, &message);
        message
    }

    /// Another client deletes a message
    pub async fn remote_delete(&self, id: &MessageId) -> bool {
        let mut state = self.state.lock().await;
        let removed = Self::remove_row(&mut state, id);
        self.broadcast_delete(&mut state, id);
        removed
    }

    /// Deliver a raw change to every open feed, returning how many received it
    pub async fn push(&self, change: FeedChange) -> usize {
        let mut state = self.state.lock().await;
        Self::deliver(&mut state, change)
    }

    /// Deliver an insert change carrying `message` as the new row
    pub async fn push_insert(&self, message: &Message) -> usize {
        let record = serde_json::to_value(message).unwrap_or_default();
        self.push(FeedChange::insert(
            &self.config.feed.schema,
            &self.config.feed.table,
            record,
        ))
        .await
    }

    /// Deliver a delete change for `id`
    pub async fn push_delete(&self, id: &MessageId) -> usize {
        self.push(FeedChange::delete(
            &self.config.feed.schema,
            &self.config.feed.table,
            serde_json::json!({ "id": id }),
        ))
        .await
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub async fn rows(&self) -> Vec<Message> {
        self.state.lock().await.rows.clone()
    }

    pub async fn stats(&self) -> BackendStats {
        self.state.lock().await.stats.clone()
    }

    pub async fn open_feed_count(&self) -> usize {
        self.state.lock().await.feeds.len()
    }

    pub async fn requested_logins(&self) -> Vec<String> {
        self.state.lock().await.requested_logins.clone()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn create_row(&self, state: &mut BackendState, content: &str, author: &AuthorId) -> Message {
        let id = MessageId::from(state.next_id.to_string());
        state.next_id += 1;
        let created_at = Timestamp::from_micros(state.clock);
        state.clock += self.config.clock_step_micros;

        let message = Message::new(id, content, author.clone(), created_at);
        state.rows.push(message.clone());
        message
    }

    fn remove_row(state: &mut BackendState, id: &MessageId) -> bool {
        let before = state.rows.len();
        state.rows.retain(|m| &m.id != id);
        state.rows.len() != before
    }

    fn broadcast_insert(&self, state: &mut BackendState, message: &Message) {
        let record = serde_json::to_value(message).unwrap_or_default();
        let change = FeedChange::insert(&self.config.feed.schema, &self.config.feed.table, record);
        Self::deliver(state, change);
    }

    fn broadcast_delete(&self, state: &mut BackendState, id: &MessageId) {
        let change = FeedChange::delete(
            &self.config.feed.schema,
            &self.config.feed.table,
            serde_json::json!({ "id": id }),
        );
        Self::deliver(state, change);
    }

    fn deliver(state: &mut BackendState, change: FeedChange) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sender) in &state.feeds {
            match sender.try_send(change.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(subscription = %id, "Feed buffer full, change dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            state.feeds.remove(&id);
        }
        state.stats.changes_delivered += delivered as u64;
        delivered
    }
}

// ----------------------------------------------------------------------------
// Collaborator Implementations
// ----------------------------------------------------------------------------

#[async_trait::async_trait]
impl MessageRepository for InMemoryBackend {
    async fn list_messages(&self) -> ChatResult<Vec<Message>> {
        let mut state = self.state.lock().await;
        state.stats.bulk_reads += 1;
        if state.faults.fail_bulk_read {
            return Err(TransportError::BulkReadFailed {
                reason: "injected fault".to_string(),
            }
            .into());
        }

        let mut rows = state.rows.clone();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn insert_message(
        &self,
        content: &str,
        author: &AuthorId,
    ) -> ChatResult<Option<Message>> {
        let mut state = self.state.lock().await;
        state.stats.inserts += 1;
        if state.faults.fail_insert {
            return Err(TransportError::InsertFailed {
                reason: "injected fault".to_string(),
            }
            .into());
        }

        let message = self.create_row(&mut state, content, author);
        debug!(id = %message.id, author = %author, "Row inserted");
        if self.config.broadcast_writes {
            self.broadcast_insert(&mut state, &message);
        }
        Ok(self.config.return_created_rows.then_some(message))
    }

    async fn delete_message(&self, id: &MessageId) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        state.stats.deletes += 1;
        if state.faults.fail_delete {
            return Err(TransportError::DeleteFailed {
                id: id.to_string(),
                reason: "injected fault".to_string(),
            }
            .into());
        }

        Self::remove_row(&mut state, id);
        if self.config.broadcast_writes {
            self.broadcast_delete(&mut state, id);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PushFeed for InMemoryBackend {
    async fn open(&self) -> ChatResult<FeedHandle> {
        let mut state = self.state.lock().await;
        if state.faults.fail_open {
            return Err(TransportError::FeedOpenFailed {
                reason: "injected fault".to_string(),
            }
            .into());
        }

        let (sender, handle) = FeedHandle::channel(self.config.feed_buffer_size);
        state.feeds.insert(handle.id(), sender);
        state.stats.feeds_opened += 1;
        info!(subscription = %handle.id(), "Feed opened");
        Ok(handle)
    }

    async fn close(&self, handle: FeedHandle) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        state.feeds.remove(&handle.id());
        state.stats.feeds_closed += 1;
        info!(subscription = %handle.id(), "Feed closed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthProvider for InMemoryBackend {
    async fn request_login_link(&self, email: &str) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        state.stats.login_requests += 1;
        if state.faults.fail_login {
            return Err(TransportError::LoginRequestFailed {
                email: email.to_string(),
                reason: "injected fault".to_string(),
            }
            .into());
        }
        state.requested_logins.push(email.to_string());
        Ok(())
    }

    async fn current_session(&self) -> ChatResult<Option<Session>> {
        let mut state = self.state.lock().await;
        state.stats.session_queries += 1;
        if state.faults.fail_session_query {
            return Err(TransportError::SessionQueryFailed {
                reason: "injected fault".to_string(),
            }
            .into());
        }
        Ok(state.session.clone())
    }

    async fn logout(&self) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        state.stats.logouts += 1;
        if state.faults.fail_logout {
            return Err(TransportError::LogoutFailed {
                reason: "injected fault".to_string(),
            }
            .into());
        }
        state.session = None;
        Ok(())
    }
}
