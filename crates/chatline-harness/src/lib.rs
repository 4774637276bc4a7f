//! Chatline Harness - in-memory testing backend
//!
//! Stands in for the hosted message store, change feed and authentication
//! service so the controller can be exercised deterministically:
//!
//! - **InMemoryBackend**: rows, feeds and sessions held in memory, with call
//!   counters and per-operation fault injection
//! - **ChatHarness**: a controller wired to a backend, with helpers to pump feed
//!   changes and collect published app events
//!
//! ```rust,ignore
//! let backend = InMemoryBackend::default();
//! backend.set_session(Some(Session::authenticated("ada@example.com"))).await;
//! let mut harness = ChatHarness::started(CoreConfig::testing(), backend).await?;
//!
//! harness.controller.send_message("hello").await;
//! harness.pump().await;
//! assert_eq!(harness.contents(), vec!["hello"]);
//! ```

pub mod backend;
pub mod config;
pub mod test_harness;

pub use backend::{BackendStats, FaultPlan, InMemoryBackend};
pub use config::BackendConfig;
pub use test_harness::ChatHarness;

use chatline_core::{Message, Timestamp};

/// Build a message with a millisecond timestamp
pub fn message(id: i64, content: &str, author: &str, created_at_millis: i64) -> Message {
    Message::new(id, content, author, Timestamp::from_millis(created_at_millis))
}
