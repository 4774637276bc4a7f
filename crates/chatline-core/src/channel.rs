//! Controller Channel Protocol
//!
//! Typed messages between front-ends and the controller loop:
//! - `Command`: UI → Controller (user intent)
//! - `AppEvent`: Controller → UI (state changes only)

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ChannelConfig;
use crate::errors::{ChannelError, ChatResult};
use crate::types::{Message, MessageId, Session};

// ----------------------------------------------------------------------------
// Command: UI → Controller
// ----------------------------------------------------------------------------

/// User actions sent to the controller loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Post a message as the current identity
    SendMessage { content: String },
    /// Delete a message (administrators only)
    DeleteMessage { id: MessageId },
    /// Email a login link
    RequestLogin { email: String },
    /// Re-query the session after an out-of-band confirmation
    RefreshSession,
    /// End the current session
    Logout,
    /// Tear down the feed and stop the loop
    Shutdown,
}

// ----------------------------------------------------------------------------
// AppEvent: Controller → UI
// ----------------------------------------------------------------------------

/// Which user action an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Send,
    Delete,
    Login,
    Logout,
}

/// State changes published by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Initial load finished and the feed is live
    Ready { message_count: usize },
    /// The ordered message list changed
    MessagesChanged { messages: Vec<Message> },
    /// The current session changed
    SessionChanged { session: Session, can_delete: bool },
    /// An action was silently rejected (empty input, anonymous, not an admin)
    ActionRejected { action: Action, reason: String },
    /// An external call failed and the action was abandoned
    ActionFailed { action: Action, error: String },
    /// A login link was sent
    LoginLinkSent { email: String },
    /// The loop has stopped and the feed is closed
    Stopped,
}

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

/// Create bounded command channel (UI → Controller)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size.max(1))
}

/// Create bounded app event channel (Controller → UI)
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size.max(1))
}

/// Non-blocking send that reports why a message could not be queued
pub trait NonBlockingSend<T> {
    fn send_nonblocking(&self, value: T) -> ChatResult<()>;
}

impl<T> NonBlockingSend<T> for mpsc::Sender<T> {
    fn send_nonblocking(&self, value: T) -> ChatResult<()> {
        self.try_send(value).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::ChannelFull.into(),
            mpsc::error::TrySendError::Closed(_) => ChannelError::ChannelClosed.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChatError;

    #[test]
    fn test_nonblocking_send_reports_full_and_closed() {
        let config = ChannelConfig {
            command_buffer_size: 1,
            ..ChannelConfig::testing()
        };
        let (sender, receiver) = create_command_channel(&config);

        sender.send_nonblocking(Command::RefreshSession).unwrap();
        assert_eq!(
            sender.send_nonblocking(Command::Logout),
            Err(ChatError::Channel(ChannelError::ChannelFull))
        );

        drop(receiver);
        assert_eq!(
            sender.send_nonblocking(Command::Shutdown),
            Err(ChatError::Channel(ChannelError::ChannelClosed))
        );
    }

    #[test]
    fn test_app_events_arrive_in_order() {
        let (sender, mut receiver) = create_app_event_channel(&ChannelConfig::testing());
        sender
            .send_nonblocking(AppEvent::Ready { message_count: 0 })
            .unwrap();
        sender.send_nonblocking(AppEvent::Stopped).unwrap();
        drop(sender);

        tokio_test::block_on(async {
            assert_eq!(
                receiver.recv().await,
                Some(AppEvent::Ready { message_count: 0 })
            );
            assert_eq!(receiver.recv().await, Some(AppEvent::Stopped));
            assert_eq!(receiver.recv().await, None);
        });
    }
}
