//! Chatline Core
//!
//! Client-side reconciliation engine for a single shared chat room. A bulk read
//! seeds an ordered, duplicate-free message store; a realtime push feed keeps
//! it current; a session manager tracks the authenticated identity; and an
//! admin policy gates deletion. The external message store, push feed and
//! authentication service are reached only through the traits in
//! [`collaborators`].

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod errors;
pub mod handle;
pub mod message_store;
pub mod policy;
pub mod session;
pub mod subscriber;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    create_app_event_channel, create_command_channel, Action, AppEvent, AppEventReceiver,
    AppEventSender, Command, CommandReceiver, CommandSender, NonBlockingSend,
};
pub use collaborators::{
    AuthProvider, ChangeKind, FeedChange, FeedHandle, MessageRepository, PushFeed, SubscriptionId,
};
pub use config::{AdminPolicyConfig, ChannelConfig, ControllerConfig, CoreConfig, FeedConfig};
pub use controller::{
    ChatController, ControllerStats, DeleteOutcome, LoginOutcome, RejectReason, SendOutcome,
};
pub use errors::{ChannelError, ChatError, ChatResult, TransportError};
pub use handle::ControllerHandle;
pub use message_store::{MessageStore, MessageStoreStats};
pub use policy::AdminPolicy;
pub use session::SessionManager;
pub use subscriber::{
    DispatchOutcome, FeedEvent, RealtimeSubscriber, SubscriberStats, SubscriptionState,
};
pub use types::{AuthorId, Message, MessageId, Session, Timestamp};
