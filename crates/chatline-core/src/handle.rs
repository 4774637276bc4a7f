//! Running controller handle
//!
//! Moves a [`ChatController`] onto its own task. Front-ends send commands
//! through the handle and read app events from its receiver.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channel::{
    create_app_event_channel, create_command_channel, AppEventReceiver, Command, CommandSender,
};
use crate::config::ChannelConfig;
use crate::controller::ChatController;
use crate::errors::{ChannelError, ChatError, ChatResult};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a controller loop running on its own task
pub struct ControllerHandle {
    command_sender: CommandSender,
    app_event_receiver: Option<AppEventReceiver>,
    join: Option<JoinHandle<ChatResult<()>>>,
}

impl ControllerHandle {
    /// Spawn the controller loop; it starts itself if not started yet
    pub fn spawn(controller: ChatController, channels: &ChannelConfig) -> Self {
        let (command_sender, command_receiver) = create_command_channel(channels);
        let (app_event_sender, app_event_receiver) = create_app_event_channel(channels);

        let mut controller = controller.with_app_events(app_event_sender);
        let join = tokio::spawn(async move { controller.run(command_receiver).await });

        Self {
            command_sender,
            app_event_receiver: Some(app_event_receiver),
            join: Some(join),
        }
    }

    /// Take the app event receiver (can only be called once)
    pub fn take_app_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.app_event_receiver.take()
    }

    pub async fn send_command(&self, command: Command) -> ChatResult<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| ChannelError::ChannelClosed.into())
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the loop to finish on its own
    pub async fn wait(&mut self) -> ChatResult<()> {
        match self.join.take() {
            Some(handle) => join_result(handle.await),
            None => Ok(()),
        }
    }

    /// Stop the loop and wait for the feed to close
    pub async fn shutdown(&mut self) -> ChatResult<()> {
        info!("Shutting down chat controller");
        let _ = self.send_command(Command::Shutdown).await;

        let Some(mut handle) = self.join.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
            Ok(result) => join_result(result),
            Err(_) => {
                warn!("Controller did not stop in time, aborting");
                handle.abort();
                Err(ChatError::invalid_state(
                    "ControllerHandle",
                    "stopped",
                    "shutdown timed out",
                ))
            }
        }
    }
}

fn join_result(result: Result<ChatResult<()>, tokio::task::JoinError>) -> ChatResult<()> {
    match result {
        Ok(result) => result,
        Err(e) => Err(ChatError::invalid_state(
            "ControllerHandle",
            "running",
            format!("controller task failed: {}", e),
        )),
    }
}
