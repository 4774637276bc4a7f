//! High-level test harness
//!
//! Wires a [`ChatController`] to an [`InMemoryBackend`] and captures the app
//! events it publishes, so tests can drive the controller step by step.

use std::time::Duration;

use chatline_core::{
    create_app_event_channel, AppEvent, AppEventReceiver, ChatController, ChatResult, CoreConfig,
    DispatchOutcome,
};

use crate::backend::InMemoryBackend;

/// How long `pump` waits for another change before deciding the feed is idle
const IDLE_WINDOW: Duration = Duration::from_millis(20);

pub struct ChatHarness {
    pub backend: InMemoryBackend,
    pub controller: ChatController,
    events: AppEventReceiver,
}

impl ChatHarness {
    /// Build a controller over `backend` without starting it
    pub fn new(config: CoreConfig, backend: InMemoryBackend) -> ChatResult<Self> {
        let (repository, feed, auth) = backend.collaborators();
        let (sender, events) = create_app_event_channel(&config.channels);
        let controller = ChatController::new(&config, repository, feed, auth)?.with_app_events(sender);

        Ok(Self {
            backend,
            controller,
            events,
        })
    }

    /// Build and start a controller over `backend`
    pub async fn started(config: CoreConfig, backend: InMemoryBackend) -> ChatResult<Self> {
        let mut harness = Self::new(config, backend)?;
        harness.controller.start().await?;
        Ok(harness)
    }

    /// Merge every change currently waiting on the feed
    pub async fn pump(&mut self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) =
            tokio::time::timeout(IDLE_WINDOW, self.controller.process_next_change()).await
        {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Every app event published so far
    pub fn drain_events(&mut self) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Contents of the controller's store, in order
    pub fn contents(&self) -> Vec<String> {
        self.controller
            .snapshot()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }
}
