//! Integration tests for the chat controller
//!
//! These tests run the controller against the in-memory backend and verify
//! reconciliation of the bulk read with the push feed, the send/delete gates,
//! session handling and teardown.

use std::time::Duration;

use chatline_core::*;
use chatline_harness::{message, BackendConfig, ChatHarness, FaultPlan, InMemoryBackend};
use serde_json::json;

const ADMIN: &str = "root@example.com";
const USER: &str = "ada@example.com";

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn config() -> CoreConfig {
    CoreConfig::testing().with_admins([ADMIN])
}

fn ids(harness: &ChatHarness) -> Vec<String> {
    harness
        .controller
        .snapshot()
        .iter()
        .map(|m| m.id.to_string())
        .collect()
}

fn millis(harness: &ChatHarness) -> Vec<i64> {
    harness
        .controller
        .snapshot()
        .iter()
        .map(|m| m.created_at.as_millis())
        .collect()
}

async fn seeded_backend(config: BackendConfig, identity: Option<&str>) -> InMemoryBackend {
    let backend = InMemoryBackend::with_rows(
        config,
        vec![
            message(1, "first", "bob@example.com", 10),
            message(2, "second", "bob@example.com", 20),
        ],
    );
    backend.set_session(identity.map(Session::authenticated)).await;
    backend
}

// ----------------------------------------------------------------------------
// Reconciliation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_reconciliation_scenario() {
    let backend = seeded_backend(BackendConfig::manual_feed(), Some(USER)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    assert_eq!(ids(&harness), vec!["1", "2"]);

    // Duplicate of a seeded row
    backend
        .push_insert(&message(2, "second", "bob@example.com", 20))
        .await;
    assert_eq!(
        harness.pump().await,
        vec![DispatchOutcome::DuplicateIgnored(MessageId::from(2))]
    );
    assert_eq!(harness.controller.snapshot().len(), 2);

    // Lands between the seeded rows
    backend
        .push_insert(&message(3, "third", "bob@example.com", 15))
        .await;
    harness.pump().await;
    assert_eq!(ids(&harness), vec!["1", "3", "2"]);
    assert_eq!(millis(&harness), vec![10, 15, 20]);

    backend.push_delete(&MessageId::from(1)).await;
    harness.pump().await;
    assert_eq!(ids(&harness), vec!["3", "2"]);

    backend.push_delete(&MessageId::from(99)).await;
    assert_eq!(
        harness.pump().await,
        vec![DispatchOutcome::AbsentIgnored(MessageId::from(99))]
    );
    assert_eq!(ids(&harness), vec!["3", "2"]);

    // Non-admin delete never reaches the backend
    let outcome = harness.controller.delete_message(&MessageId::from(2)).await;
    assert_eq!(outcome, DeleteOutcome::Rejected(RejectReason::NotAdmin));
    assert_eq!(backend.stats().await.deletes, 0);
    assert_eq!(ids(&harness), vec!["3", "2"]);
}

#[tokio::test]
async fn test_malformed_and_unrelated_changes_are_dropped() {
    let backend = seeded_backend(BackendConfig::manual_feed(), None).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();

    backend
        .push(FeedChange::insert("public", "messages", json!({ "id": 7 })))
        .await;
    backend
        .push(FeedChange::insert(
            "public",
            "profiles",
            json!({ "id": 8, "content": "x", "user_email": USER, "created_at": 5 }),
        ))
        .await;
    backend
        .push_insert(&message(4, "after", "bob@example.com", 30))
        .await;

    let outcomes = harness.pump().await;
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], DispatchOutcome::Dropped(_)));
    assert!(matches!(outcomes[1], DispatchOutcome::Dropped(_)));
    assert_eq!(outcomes[2], DispatchOutcome::Inserted(MessageId::from(4)));
    assert_eq!(ids(&harness), vec!["1", "2", "4"]);
}

// ----------------------------------------------------------------------------
// Sending
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_send_with_echo_is_deduplicated() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();

    let outcome = harness.controller.send_message("hello").await;
    assert_eq!(outcome, SendOutcome::Sent { echoed: true });
    assert_eq!(harness.contents(), vec!["first", "second", "hello"]);

    // The feed delivers the same row again
    assert_eq!(
        harness.pump().await,
        vec![DispatchOutcome::DuplicateIgnored(MessageId::from(3))]
    );
    assert_eq!(harness.contents(), vec!["first", "second", "hello"]);
    assert_eq!(harness.controller.snapshot()[2].author, AuthorId::from(USER));
}

#[tokio::test]
async fn test_send_without_returned_row_waits_for_feed() {
    let backend = seeded_backend(BackendConfig::write_only(), Some(USER)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();

    let outcome = harness.controller.send_message("hello").await;
    assert_eq!(outcome, SendOutcome::Sent { echoed: false });
    assert_eq!(harness.controller.snapshot().len(), 2);

    harness.pump().await;
    assert_eq!(harness.contents(), vec!["first", "second", "hello"]);
}

#[tokio::test]
async fn test_feed_only_config_waits_for_feed() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    let config = CoreConfig {
        controller: ControllerConfig::feed_only(),
        ..config()
    };
    let mut harness = ChatHarness::started(config, backend.clone()).await.unwrap();

    // The backend returns the row, but it is not merged early
    let outcome = harness.controller.send_message("hello").await;
    assert_eq!(outcome, SendOutcome::Sent { echoed: false });
    assert_eq!(harness.controller.snapshot().len(), 2);

    assert_eq!(
        harness.pump().await,
        vec![DispatchOutcome::Inserted(MessageId::from(3))]
    );
    assert_eq!(harness.contents(), vec!["first", "second", "hello"]);
}

#[tokio::test]
async fn test_send_before_start_does_not_block_history() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    let mut harness = ChatHarness::new(config(), backend.clone()).unwrap();

    assert!(harness.controller.refresh_session().await.unwrap());
    let outcome = harness.controller.send_message("early").await;
    assert_eq!(outcome, SendOutcome::Sent { echoed: false });
    assert!(harness.controller.snapshot().is_empty());

    harness.controller.start().await.unwrap();
    assert_eq!(ids(&harness), vec!["1", "2", "3"]);
    assert_eq!(harness.contents(), vec!["first", "second", "early"]);
    assert_eq!(harness.controller.subscription_state(), SubscriptionState::Subscribed);
}

#[tokio::test]
async fn test_empty_or_anonymous_send_is_noop() {
    let backend = seeded_backend(BackendConfig::default(), None).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();

    assert_eq!(
        harness.controller.send_message("hello").await,
        SendOutcome::Rejected(RejectReason::NotAuthenticated)
    );

    backend.set_session(Some(Session::authenticated(USER))).await;
    assert!(harness.controller.refresh_session().await.unwrap());

    for content in ["", "   ", "\n\t"] {
        assert_eq!(
            harness.controller.send_message(content).await,
            SendOutcome::Rejected(RejectReason::EmptyContent)
        );
    }

    assert_eq!(backend.stats().await.inserts, 0);
    assert_eq!(harness.controller.snapshot().len(), 2);
    assert_eq!(harness.controller.stats().rejected_actions, 4);
}

#[tokio::test]
async fn test_send_failure_is_absorbed() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    backend
        .set_faults(FaultPlan {
            fail_insert: true,
            ..FaultPlan::default()
        })
        .await;

    let outcome = harness.controller.send_message("hello").await;
    assert!(matches!(outcome, SendOutcome::Failed(ref e) if e.is_transport()));

    // Later feed changes still apply
    backend.set_faults(FaultPlan::default()).await;
    backend.remote_insert("from bob", "bob@example.com").await;
    harness.pump().await;
    assert_eq!(harness.contents(), vec!["first", "second", "from bob"]);

    let events = harness.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        AppEvent::ActionFailed {
            action: Action::Send,
            ..
        }
    )));
}

// ----------------------------------------------------------------------------
// Deleting
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_admin_delete_arrives_through_feed() {
    let backend = seeded_backend(BackendConfig::default(), Some(ADMIN)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    assert!(harness.controller.can_delete());

    let outcome = harness.controller.delete_message(&MessageId::from(1)).await;
    assert_eq!(outcome, DeleteOutcome::Requested);
    // Not removed locally until the feed reports it
    assert_eq!(ids(&harness), vec!["1", "2"]);

    harness.pump().await;
    assert_eq!(ids(&harness), vec!["2"]);
    assert_eq!(backend.stats().await.deletes, 1);
}

#[tokio::test]
async fn test_anonymous_delete_is_rejected() {
    let backend = seeded_backend(BackendConfig::default(), None).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    assert!(!harness.controller.can_delete());

    let outcome = harness.controller.delete_message(&MessageId::from(1)).await;
    assert_eq!(outcome, DeleteOutcome::Rejected(RejectReason::NotAuthenticated));
    assert_eq!(backend.stats().await.deletes, 0);
}

#[tokio::test]
async fn test_delete_failure_is_absorbed() {
    let backend = seeded_backend(BackendConfig::default(), Some(ADMIN)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    backend
        .set_faults(FaultPlan {
            fail_delete: true,
            ..FaultPlan::default()
        })
        .await;

    let outcome = harness.controller.delete_message(&MessageId::from(1)).await;
    assert!(matches!(outcome, DeleteOutcome::Failed(_)));
    assert_eq!(ids(&harness), vec!["1", "2"]);
    assert_eq!(harness.controller.stats().transport_failures, 1);
}

// ----------------------------------------------------------------------------
// Startup
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_bulk_read_is_surfaced() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    backend
        .set_faults(FaultPlan {
            fail_bulk_read: true,
            ..FaultPlan::default()
        })
        .await;

    let mut harness = ChatHarness::new(config(), backend.clone()).unwrap();
    let err = harness.controller.start().await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::Transport(TransportError::BulkReadFailed { .. })
    ));
    assert!(harness.controller.snapshot().is_empty());
    assert_eq!(harness.controller.subscription_state(), SubscriptionState::Idle);
    assert_eq!(backend.open_feed_count().await, 0);
}

#[tokio::test]
async fn test_failed_feed_open_can_be_retried() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    backend
        .set_faults(FaultPlan {
            fail_open: true,
            ..FaultPlan::default()
        })
        .await;

    let mut harness = ChatHarness::new(config(), backend.clone()).unwrap();
    let err = harness.controller.start().await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::Transport(TransportError::FeedOpenFailed { .. })
    ));
    assert!(!harness.controller.is_started());
    assert_eq!(harness.controller.subscription_state(), SubscriptionState::Idle);
    assert_eq!(backend.open_feed_count().await, 0);
    assert!(harness.drain_events().is_empty());

    backend.set_faults(FaultPlan::default()).await;
    harness.controller.start().await.unwrap();
    assert!(harness.controller.is_started());
    assert_eq!(
        harness.controller.subscription_state(),
        SubscriptionState::Subscribed
    );
    assert_eq!(ids(&harness), vec!["1", "2"]);
    assert_eq!(backend.open_feed_count().await, 1);
    assert_eq!(harness.drain_events()[0], AppEvent::Ready { message_count: 2 });
}

#[tokio::test]
async fn test_start_restores_existing_session() {
    let backend = seeded_backend(BackendConfig::default(), Some(ADMIN)).await;
    let mut harness = ChatHarness::started(config(), backend).await.unwrap();

    assert_eq!(harness.controller.session(), &Session::authenticated(ADMIN));
    let events = harness.drain_events();
    assert_eq!(events[0], AppEvent::Ready { message_count: 2 });
    assert!(events.contains(&AppEvent::SessionChanged {
        session: Session::authenticated(ADMIN),
        can_delete: true,
    }));
}

#[tokio::test]
async fn test_session_query_failure_starts_anonymous() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    backend
        .set_faults(FaultPlan {
            fail_session_query: true,
            ..FaultPlan::default()
        })
        .await;

    let harness = ChatHarness::started(config(), backend).await.unwrap();
    assert_eq!(harness.controller.session(), &Session::Anonymous);
    assert_eq!(harness.controller.snapshot().len(), 2);
}

#[tokio::test]
async fn test_start_twice_is_invalid() {
    let backend = seeded_backend(BackendConfig::default(), None).await;
    let mut harness = ChatHarness::started(config(), backend).await.unwrap();
    assert!(matches!(
        harness.controller.start().await,
        Err(ChatError::InvalidState { .. })
    ));
}

// ----------------------------------------------------------------------------
// Login and Logout
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_login_flow() {
    let backend = seeded_backend(BackendConfig::default(), None).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();

    assert_eq!(
        harness.controller.request_login("not-an-email").await,
        LoginOutcome::Rejected(RejectReason::InvalidEmail)
    );
    assert_eq!(
        harness.controller.request_login(USER).await,
        LoginOutcome::LinkSent
    );
    assert_eq!(harness.controller.pending_login(), Some(USER));

    // Not confirmed yet
    assert!(!harness.controller.refresh_session().await.unwrap());

    assert!(backend.confirm_login(USER).await);
    assert!(harness.controller.refresh_session().await.unwrap());
    assert_eq!(harness.controller.session(), &Session::authenticated(USER));
    assert!(harness.controller.pending_login().is_none());
}

#[tokio::test]
async fn test_login_request_failure_is_absorbed() {
    let backend = seeded_backend(BackendConfig::default(), None).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    backend
        .set_faults(FaultPlan {
            fail_login: true,
            ..FaultPlan::default()
        })
        .await;
    harness.drain_events();

    let outcome = harness.controller.request_login(USER).await;
    assert!(matches!(
        outcome,
        LoginOutcome::Failed(ChatError::Transport(TransportError::LoginRequestFailed { .. }))
    ));
    assert!(harness.controller.pending_login().is_none());
    assert!(backend.requested_logins().await.is_empty());
    assert_eq!(harness.controller.stats().transport_failures, 1);

    let events = harness.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        AppEvent::ActionFailed {
            action: Action::Login,
            ..
        }
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, AppEvent::LoginLinkSent { .. })));
}

#[tokio::test]
async fn test_outage_after_start_leaves_store_intact() {
    let backend = seeded_backend(BackendConfig::default(), Some(ADMIN)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    backend.set_faults(FaultPlan::outage()).await;

    assert!(matches!(
        harness.controller.send_message("hello").await,
        SendOutcome::Failed(_)
    ));
    assert!(matches!(
        harness.controller.delete_message(&MessageId::from(1)).await,
        DeleteOutcome::Failed(_)
    ));
    assert!(matches!(
        harness.controller.request_login(USER).await,
        LoginOutcome::Failed(_)
    ));
    assert!(harness.controller.refresh_session().await.is_err());
    assert_eq!(harness.controller.session(), &Session::authenticated(ADMIN));

    assert!(harness.controller.logout().await.is_err());
    assert_eq!(harness.controller.session(), &Session::Anonymous);

    assert_eq!(ids(&harness), vec!["1", "2"]);
    assert_eq!(harness.controller.stats().transport_failures, 4);

    // The open feed keeps working once the backend recovers
    backend.set_faults(FaultPlan::default()).await;
    backend.remote_insert("back again", "bob@example.com").await;
    harness.pump().await;
    assert_eq!(harness.contents(), vec!["first", "second", "back again"]);
}

#[tokio::test]
async fn test_logout_clears_session_even_if_remote_fails() {
    let backend = seeded_backend(BackendConfig::default(), Some(ADMIN)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();
    backend
        .set_faults(FaultPlan {
            fail_logout: true,
            ..FaultPlan::default()
        })
        .await;

    assert!(harness.controller.logout().await.is_err());
    assert_eq!(harness.controller.session(), &Session::Anonymous);
    assert!(!harness.controller.can_delete());
}

// ----------------------------------------------------------------------------
// Teardown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_no_mutation_after_stop() {
    let backend = seeded_backend(BackendConfig::default(), Some(USER)).await;
    let mut harness = ChatHarness::started(config(), backend.clone()).await.unwrap();

    harness.controller.stop().await.unwrap();
    assert_eq!(
        harness.controller.subscription_state(),
        SubscriptionState::Unsubscribed
    );
    assert_eq!(backend.open_feed_count().await, 0);
    assert_eq!(backend.stats().await.feeds_closed, 1);

    // Transport no longer has anywhere to deliver
    assert_eq!(
        backend
            .push_insert(&message(5, "late", "bob@example.com", 40))
            .await,
        0
    );

    // A change that slipped through is still ignored
    let late = FeedChange::delete("public", "messages", json!({ "id": 1 }));
    assert_eq!(harness.controller.apply_change(late), DispatchOutcome::Inactive);
    assert_eq!(ids(&harness), vec!["1", "2"]);

    // Stopping again is harmless
    harness.controller.stop().await.unwrap();
    assert_eq!(backend.stats().await.feeds_closed, 1);
}

#[tokio::test]
async fn test_spawned_controller_round_trip() {
    let backend = seeded_backend(BackendConfig::default(), Some(ADMIN)).await;
    let (repository, feed, auth) = backend.collaborators();
    let config = config();
    let controller = ChatController::new(&config, repository, feed, auth).unwrap();

    let mut handle = ControllerHandle::spawn(controller, &config.channels);
    let mut events = handle.take_app_event_receiver().unwrap();
    assert!(handle.take_app_event_receiver().is_none());

    let ready = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap();
    assert_eq!(ready, Some(AppEvent::Ready { message_count: 2 }));

    handle
        .send_command(Command::SendMessage {
            content: "hi".to_string(),
        })
        .await
        .unwrap();

    // Wait until the new message is visible
    let mut latest = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), events.recv()).await
    {
        if let AppEvent::MessagesChanged { messages } = event {
            latest = messages;
            if latest.len() == 3 {
                break;
            }
        }
    }
    assert_eq!(latest.last().map(|m| m.content.as_str()), Some("hi"));

    handle.shutdown().await.unwrap();
    assert!(!handle.is_running());
    assert_eq!(backend.open_feed_count().await, 0);
}
