//! Chat Controller
//!
//! The composition layer. It is the only component that performs the initial
//! bulk read, seeds the [`MessageStore`], owns the [`RealtimeSubscriber`],
//! calls the external insert/delete operations and consults the
//! [`AdminPolicy`] before a delete leaves the process.
//!
//! All state is owned by one value and every mutation happens on the single
//! loop in [`ChatController::run`]: user commands and feed changes are
//! processed strictly one at a time, so the store needs no locking.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channel::{Action, AppEvent, AppEventSender, Command, CommandReceiver, NonBlockingSend};
use crate::collaborators::{AuthProvider, FeedChange, MessageRepository, PushFeed};
use crate::config::{ControllerConfig, CoreConfig};
use crate::errors::{ChannelError, ChatError, ChatResult};
use crate::message_store::{MessageStore, MessageStoreStats};
use crate::policy::AdminPolicy;
use crate::session::SessionManager;
use crate::subscriber::{DispatchOutcome, RealtimeSubscriber, SubscriptionState};
use crate::types::{Message, MessageId, Session};

// ----------------------------------------------------------------------------
// Action Outcomes
// ----------------------------------------------------------------------------

/// Why an action was dropped without reaching the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyContent,
    NotAuthenticated,
    NotAdmin,
    InvalidEmail,
}

impl core::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "message is empty"),
            Self::NotAuthenticated => write!(f, "not logged in"),
            Self::NotAdmin => write!(f, "only administrators may delete messages"),
            Self::InvalidEmail => write!(f, "not a valid email address"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The insert was accepted; `echoed` if the returned row was merged already
    Sent { echoed: bool },
    Rejected(RejectReason),
    Failed(ChatError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The delete was accepted; removal arrives through the feed
    Requested,
    Rejected(RejectReason),
    Failed(ChatError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    LinkSent,
    Rejected(RejectReason),
    Failed(ChatError),
}

/// Statistics for the controller loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub commands_processed: u64,
    pub feed_changes_processed: u64,
    pub sends: u64,
    pub deletes: u64,
    pub rejected_actions: u64,
    pub transport_failures: u64,
}

// ----------------------------------------------------------------------------
// Chat Controller
// ----------------------------------------------------------------------------

pub struct ChatController {
    config: ControllerConfig,
    // Declared before `store` so the feed handle is dropped first
    subscriber: RealtimeSubscriber,
    store: MessageStore,
    session: SessionManager,
    policy: AdminPolicy,
    repository: Arc<dyn MessageRepository>,
    auth: Arc<dyn AuthProvider>,
    app_event_sender: Option<AppEventSender>,
    started: bool,
    running: bool,
    stats: ControllerStats,
}

impl ChatController {
    /// Create a controller wired to the given collaborators
    pub fn new(
        config: &CoreConfig,
        repository: Arc<dyn MessageRepository>,
        feed: Arc<dyn PushFeed>,
        auth: Arc<dyn AuthProvider>,
    ) -> ChatResult<Self> {
        config.validate()?;

        Ok(Self {
            config: config.controller.clone(),
            subscriber: RealtimeSubscriber::new(feed, config.feed.clone()),
            store: MessageStore::new(),
            session: SessionManager::new(),
            policy: AdminPolicy::new(&config.admin),
            repository,
            auth,
            app_event_sender: None,
            started: false,
            running: false,
            stats: ControllerStats::default(),
        })
    }

    /// Publish state changes on the given channel
    pub fn with_app_events(mut self, sender: AppEventSender) -> Self {
        self.app_event_sender = Some(sender);
        self
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Restore the session, load history, seed the store and open the feed
    ///
    /// A failed bulk read is returned to the caller; the store stays empty and
    /// the feed stays closed.
    pub async fn start(&mut self) -> ChatResult<()> {
        if self.started {
            return Err(ChatError::invalid_state(
                "ChatController",
                "not started",
                "already started",
            ));
        }

        self.restore_session().await;

        let messages = self.repository.list_messages().await.map_err(|e| {
            error!(error = %e, "Initial message load failed");
            self.stats.transport_failures += 1;
            e
        })?;
        info!(count = messages.len(), "Loaded message history");
        self.store.seed(messages)?;

        self.subscriber.subscribe().await?;
        self.started = true;

        self.publish(AppEvent::Ready {
            message_count: self.store.len(),
        });
        self.publish_session();
        self.publish_messages();
        Ok(())
    }

    async fn restore_session(&mut self) {
        match self.auth.current_session().await {
            Ok(existing) => self.session.restore(existing),
            Err(e) => {
                warn!(error = %e, "Could not query existing session, starting anonymous");
                self.stats.transport_failures += 1;
                self.session.restore(None);
            }
        }
    }

    /// Close the feed; the store is left intact but no longer changes
    pub async fn stop(&mut self) -> ChatResult<()> {
        self.running = false;
        if self.subscriber.state() != SubscriptionState::Unsubscribed {
            self.subscriber.unsubscribe().await?;
            self.publish(AppEvent::Stopped);
        }
        Ok(())
    }

    /// Unsubscribe, then discard the store with the rest of the controller
    pub async fn shutdown(mut self) -> ChatResult<()> {
        self.stop().await
    }

    /// Process commands and feed changes until shutdown
    pub async fn run(&mut self, mut commands: CommandReceiver) -> ChatResult<()> {
        if !self.started {
            self.start().await?;
        }

        info!("Chat controller loop starting");
        self.running = true;

        while self.running {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            self.stats.commands_processed += 1;
                            self.process_command(command).await;
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                change = self.subscriber.next_change() => {
                    self.apply_change(change);
                }
            }
        }

        self.stop().await?;
        info!(
            commands = self.stats.commands_processed,
            feed_changes = self.stats.feed_changes_processed,
            "Chat controller loop stopped"
        );
        Ok(())
    }

    async fn process_command(&mut self, command: Command) {
        debug!(?command, "Processing command");
        match command {
            Command::SendMessage { content } => {
                self.send_message(&content).await;
            }
            Command::DeleteMessage { id } => {
                self.delete_message(&id).await;
            }
            Command::RequestLogin { email } => {
                self.request_login(&email).await;
            }
            Command::RefreshSession => {
                if let Err(e) = self.refresh_session().await {
                    warn!(error = %e, "Session refresh failed");
                }
            }
            Command::Logout => {
                if let Err(e) = self.logout().await {
                    warn!(error = %e, "Remote logout failed; local session cleared");
                }
            }
            Command::Shutdown => {
                info!("Shutdown requested");
                self.running = false;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------------

    /// Merge one feed change into the store
    pub fn apply_change(&mut self, change: FeedChange) -> DispatchOutcome {
        self.stats.feed_changes_processed += 1;
        let outcome = self.subscriber.dispatch(change, &mut self.store);
        if outcome.changed_store() {
            self.publish_messages();
        }
        outcome
    }

    /// Wait for the next feed change and merge it
    ///
    /// Pends forever once the feed is closed. Cancel-safe.
    pub async fn process_next_change(&mut self) -> DispatchOutcome {
        let change = self.subscriber.next_change().await;
        self.apply_change(change)
    }

    // ------------------------------------------------------------------------
    // User Actions
    // ------------------------------------------------------------------------

    /// Post a message as the current identity
    ///
    /// Empty content and anonymous sessions are dropped without contacting the
    /// store. A failed insert is logged and abandoned.
    pub async fn send_message(&mut self, content: &str) -> SendOutcome {
        if content.trim().is_empty() {
            return self.reject_send(RejectReason::EmptyContent);
        }
        let Some(author) = self.session.identity().cloned() else {
            return self.reject_send(RejectReason::NotAuthenticated);
        };

        match self.repository.insert_message(content, &author).await {
            Ok(created) => {
                self.stats.sends += 1;
                let echoed = match created {
                    Some(message) if self.config.optimistic_echo => self.merge_echo(message),
                    _ => false,
                };
                debug!(author = %author, echoed, "Message sent");
                SendOutcome::Sent { echoed }
            }
            Err(e) => {
                self.record_failure(Action::Send, &e);
                SendOutcome::Failed(e)
            }
        }
    }

    /// Merge the row returned by an insert
    ///
    /// Only between `start` and `stop`: before the seed it would count as an
    /// incremental mutation and block the bulk read.
    fn merge_echo(&mut self, message: Message) -> bool {
        if !self.started || self.subscriber.state() == SubscriptionState::Unsubscribed {
            return false;
        }
        let inserted = self.store.insert_if_absent(message);
        if inserted {
            self.publish_messages();
        }
        inserted
    }

    fn reject_send(&mut self, reason: RejectReason) -> SendOutcome {
        self.record_rejection(Action::Send, reason);
        SendOutcome::Rejected(reason)
    }

    /// Delete a message if the current identity is an administrator
    pub async fn delete_message(&mut self, id: &MessageId) -> DeleteOutcome {
        if !self.policy.permits_delete(self.session.current()) {
            let reason = match self.session.identity() {
                Some(identity) => {
                    debug!(id = %id, identity = %identity, "Delete rejected, not an administrator");
                    RejectReason::NotAdmin
                }
                None => RejectReason::NotAuthenticated,
            };
            self.record_rejection(Action::Delete, reason);
            return DeleteOutcome::Rejected(reason);
        }

        match self.repository.delete_message(id).await {
            Ok(()) => {
                self.stats.deletes += 1;
                info!(id = %id, "Delete requested");
                DeleteOutcome::Requested
            }
            Err(e) => {
                self.record_failure(Action::Delete, &e);
                DeleteOutcome::Failed(e)
            }
        }
    }

    /// Ask the authentication service to email a login link
    pub async fn request_login(&mut self, email: &str) -> LoginOutcome {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            self.record_rejection(Action::Login, RejectReason::InvalidEmail);
            return LoginOutcome::Rejected(RejectReason::InvalidEmail);
        }

        match self.auth.request_login_link(email).await {
            Ok(()) => {
                self.session.mark_login_requested(email);
                self.publish(AppEvent::LoginLinkSent {
                    email: email.to_string(),
                });
                LoginOutcome::LinkSent
            }
            Err(e) => {
                self.record_failure(Action::Login, &e);
                LoginOutcome::Failed(e)
            }
        }
    }

    /// Pick up a session confirmed out of band
    ///
    /// Returns `true` if the session changed.
    pub async fn refresh_session(&mut self) -> ChatResult<bool> {
        let reported = self.auth.current_session().await?;
        let changed = self.session.apply(reported);
        if changed {
            self.publish_session();
        }
        Ok(changed)
    }

    /// End the session remotely and locally
    ///
    /// The local session is cleared even if the remote call fails.
    pub async fn logout(&mut self) -> ChatResult<()> {
        let remote = self.auth.logout().await;
        if let Err(e) = &remote {
            self.record_failure(Action::Logout, e);
        }
        let was_authenticated = self.session.is_authenticated();
        self.session.clear();
        if was_authenticated {
            self.publish_session();
        }
        remote
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Ordered messages for presentation
    pub fn snapshot(&self) -> &[Message] {
        self.store.snapshot()
    }

    pub fn session(&self) -> &Session {
        self.session.current()
    }

    pub fn pending_login(&self) -> Option<&str> {
        self.session.pending_login()
    }

    /// Whether the delete control should be offered
    pub fn can_delete(&self) -> bool {
        self.policy.permits_delete(self.session.current())
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.subscriber.state()
    }

    pub fn store_stats(&self) -> &MessageStoreStats {
        self.store.stats()
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    // ------------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------------

    fn record_rejection(&mut self, action: Action, reason: RejectReason) {
        self.stats.rejected_actions += 1;
        debug!(?action, %reason, "Action rejected");
        self.publish(AppEvent::ActionRejected {
            action,
            reason: reason.to_string(),
        });
    }

    fn record_failure(&mut self, action: Action, error: &ChatError) {
        self.stats.transport_failures += 1;
        warn!(?action, error = %error, "Action failed and was abandoned");
        self.publish(AppEvent::ActionFailed {
            action,
            error: error.to_string(),
        });
    }

    fn publish_messages(&mut self) {
        if self.config.publish_snapshots {
            let messages = self.store.snapshot().to_vec();
            self.publish(AppEvent::MessagesChanged { messages });
        }
    }

    fn publish_session(&mut self) {
        let session = self.session.current().clone();
        let can_delete = self.can_delete();
        self.publish(AppEvent::SessionChanged {
            session,
            can_delete,
        });
    }

    fn publish(&mut self, event: AppEvent) {
        let Some(sender) = &self.app_event_sender else {
            return;
        };
        match sender.send_nonblocking(event) {
            Ok(()) => {}
            Err(ChatError::Channel(ChannelError::ChannelClosed)) => {
                debug!("App event receiver dropped, no longer publishing");
                self.app_event_sender = None;
            }
            Err(e) => warn!(error = %e, "Dropping app event"),
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        if self.subscriber.is_subscribed() {
            warn!("Chat controller dropped without shutdown; feed handle closed with it");
        }
    }
}

impl core::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChatController")
            .field("session", self.session.current())
            .field("messages", &self.store.len())
            .field("subscriber", &self.subscriber)
            .field("started", &self.started)
            .field("stats", &self.stats)
            .finish()
    }
}
