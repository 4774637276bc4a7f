//! Realtime Subscriber
//!
//! Owns the lifecycle of the live feed (`Idle → Subscribed → Unsubscribed`) and
//! turns each raw feed change into exactly one [`MessageStore`] call.
//!
//! The subscriber never mutates the store on its own: the controller pulls
//! changes with [`RealtimeSubscriber::next_change`] and hands them back through
//! [`RealtimeSubscriber::dispatch`] together with the store, so every mutation
//! happens on the controller's single loop. Once [`RealtimeSubscriber::unsubscribe`]
//! returns, the feed handle is closed and `dispatch` refuses to touch the store.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::collaborators::{ChangeKind, FeedChange, FeedHandle, PushFeed};
use crate::config::FeedConfig;
use crate::errors::{ChatError, ChatResult};
use crate::message_store::MessageStore;
use crate::types::{Message, MessageId};

// ----------------------------------------------------------------------------
// Subscription State
// ----------------------------------------------------------------------------

/// Lifecycle of the live feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribed,
    /// Terminal
    Unsubscribed,
}

/// A decoded feed event relevant to the message collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Inserted(Message),
    Deleted(MessageId),
}

/// What a single dispatch did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Inserted(MessageId),
    DuplicateIgnored(MessageId),
    Removed(MessageId),
    AbsentIgnored(MessageId),
    /// Unrelated or malformed change, logged and dropped
    Dropped(String),
    /// The subscriber is not subscribed; the store was not touched
    Inactive,
}

impl DispatchOutcome {
    /// Whether the store contents changed
    pub fn changed_store(&self) -> bool {
        matches!(self, Self::Inserted(_) | Self::Removed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub received: u64,
    pub dispatched: u64,
    pub dropped_unrelated: u64,
    pub dropped_malformed: u64,
    pub ignored_after_teardown: u64,
}

/// Primary key carried by a delete event
#[derive(Deserialize)]
struct DeletedKey {
    id: MessageId,
}

// ----------------------------------------------------------------------------
// Realtime Subscriber
// ----------------------------------------------------------------------------

pub struct RealtimeSubscriber {
    feed: Arc<dyn PushFeed>,
    config: FeedConfig,
    state: SubscriptionState,
    handle: Option<FeedHandle>,
    /// Transport side of the handle has ended
    stream_ended: bool,
    stats: SubscriberStats,
}

impl RealtimeSubscriber {
    pub fn new(feed: Arc<dyn PushFeed>, config: FeedConfig) -> Self {
        Self {
            feed,
            config,
            state: SubscriptionState::Idle,
            handle: None,
            stream_ended: false,
            stats: SubscriberStats::default(),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn is_subscribed(&self) -> bool {
        self.state == SubscriptionState::Subscribed
    }

    pub fn stats(&self) -> &SubscriberStats {
        &self.stats
    }

    /// Open the feed (`Idle → Subscribed`)
    pub async fn subscribe(&mut self) -> ChatResult<()> {
        if self.state != SubscriptionState::Idle {
            return Err(ChatError::invalid_state(
                "RealtimeSubscriber",
                "Idle",
                format!("{:?}", self.state),
            ));
        }

        let handle = self.feed.open().await?;
        info!(
            subscription = %handle.id(),
            schema = %self.config.schema,
            table = %self.config.table,
            "Subscribed to message feed"
        );
        self.handle = Some(handle);
        self.stream_ended = false;
        self.state = SubscriptionState::Subscribed;
        Ok(())
    }

    /// Close the feed (`→ Unsubscribed`)
    ///
    /// After this returns no change can be dispatched into a store. Calling it
    /// again, or from `Idle`, is a no-op apart from the state change.
    pub async fn unsubscribe(&mut self) -> ChatResult<()> {
        let previous = self.state;
        self.state = SubscriptionState::Unsubscribed;

        let Some(mut handle) = self.handle.take() else {
            if previous != SubscriptionState::Unsubscribed {
                debug!(?previous, "Unsubscribed without an open feed");
            }
            return Ok(());
        };

        handle.close_receiver();
        let subscription = handle.id();
        if let Err(e) = self.feed.close(handle).await {
            // The receiver is already closed, so a failed close cannot leak events
            warn!(subscription = %subscription, error = %e, "Closing message feed failed");
        }
        info!(subscription = %subscription, "Unsubscribed from message feed");
        Ok(())
    }

    /// Wait for the next raw change
    ///
    /// Never resolves while not subscribed or after the transport stream ended,
    /// which lets callers keep it in a `select!` without spinning.
    pub async fn next_change(&mut self) -> FeedChange {
        if self.state != SubscriptionState::Subscribed || self.stream_ended {
            return std::future::pending().await;
        }

        let Some(handle) = self.handle.as_mut() else {
            return std::future::pending().await;
        };

        match handle.recv().await {
            Some(change) => {
                self.stats.received += 1;
                change
            }
            None => {
                warn!(
                    subscription = %handle.id(),
                    "Message feed ended; changes are missed until the subscriber is recreated"
                );
                self.stream_ended = true;
                std::future::pending().await
            }
        }
    }

    /// Decode a raw change into an event for the configured collection
    ///
    /// `Ok(None)` means the change is unrelated to the collection.
    pub fn decode(&self, change: &FeedChange) -> ChatResult<Option<FeedEvent>> {
        if change.schema != self.config.schema || change.table != self.config.table {
            return Ok(None);
        }

        match &change.kind {
            ChangeKind::Insert => {
                let record = change
                    .record
                    .as_ref()
                    .ok_or_else(|| ChatError::malformed("insert event without a record"))?;
                Ok(Some(FeedEvent::Inserted(Message::from_record(record)?)))
            }
            ChangeKind::Delete => {
                let old_record = change
                    .old_record
                    .as_ref()
                    .ok_or_else(|| ChatError::malformed("delete event without an old record"))?;
                let key = DeletedKey::deserialize(old_record)
                    .map_err(|e| ChatError::malformed(format!("delete event: {}", e)))?;
                Ok(Some(FeedEvent::Deleted(key.id)))
            }
            // Messages are never edited
            ChangeKind::Update | ChangeKind::Other(_) => Ok(None),
        }
    }

    /// Apply one raw change to the store
    pub fn dispatch(&mut self, change: FeedChange, store: &mut MessageStore) -> DispatchOutcome {
        if self.state != SubscriptionState::Subscribed {
            self.stats.ignored_after_teardown += 1;
            debug!(state = ?self.state, "Ignoring feed change outside subscription");
            return DispatchOutcome::Inactive;
        }

        let event = match self.decode(&change) {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.stats.dropped_unrelated += 1;
                debug!(
                    schema = %change.schema,
                    table = %change.table,
                    kind = %change.kind,
                    "Dropping unrelated feed change"
                );
                return DispatchOutcome::Dropped(format!(
                    "unrelated {} on {}.{}",
                    change.kind, change.schema, change.table
                ));
            }
            Err(e) => {
                self.stats.dropped_malformed += 1;
                warn!(kind = %change.kind, error = %e, "Dropping malformed feed change");
                return DispatchOutcome::Dropped(e.to_string());
            }
        };

        self.stats.dispatched += 1;
        match event {
            FeedEvent::Inserted(message) => {
                let id = message.id.clone();
                if store.insert_if_absent(message) {
                    debug!(id = %id, "Merged inserted message");
                    DispatchOutcome::Inserted(id)
                } else {
                    DispatchOutcome::DuplicateIgnored(id)
                }
            }
            FeedEvent::Deleted(id) => {
                if store.remove_by_id(&id) {
                    debug!(id = %id, "Removed deleted message");
                    DispatchOutcome::Removed(id)
                } else {
                    DispatchOutcome::AbsentIgnored(id)
                }
            }
        }
    }
}

impl core::fmt::Debug for RealtimeSubscriber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RealtimeSubscriber")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("subscription", &self.handle.as_ref().map(FeedHandle::id))
            .field("stream_ended", &self.stream_ended)
            .field("stats", &self.stats)
            .finish()
    }
}
