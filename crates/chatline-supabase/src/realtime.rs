//! Supabase Realtime push feed
//!
//! Speaks the Phoenix channel protocol over a websocket: join the
//! `realtime:{schema}:{table}` topic with a `postgres_changes` filter, keep the
//! socket alive with heartbeats, and forward every change frame to the
//! [`FeedHandle`] returned from `open`. Closing leaves the channel, stops the
//! tasks and closes the socket. Reconnection is not attempted; a dropped socket
//! ends the handle's stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chatline_core::{
    ChangeKind, ChatResult, FeedChange, FeedHandle, PushFeed, SubscriptionId, TransportError,
};
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::config::SupabaseConfig;
use crate::error::{transport, SupabaseError, SupabaseResult};
use crate::session_store::SessionStore;

const WRITER_BUFFER: usize = 32;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// Phoenix Frames
// ----------------------------------------------------------------------------

/// One Phoenix protocol message (`vsn=1.0.0` JSON object encoding)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    pub fn join(config: &SupabaseConfig, access_token: Option<&str>, reference: u64) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": config.schema, "table": config.table }
                ],
                "private": false
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::from(token);
        }
        Self {
            topic: config.realtime_topic(),
            event: "phx_join".to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn to_message(&self) -> SupabaseResult<WsMessage> {
        Ok(WsMessage::Text(serde_json::to_string(self)?))
    }

    /// `status` of a `phx_reply`
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != "phx_reply" {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }
}

/// Row change carried in a `postgres_changes` payload
#[derive(Debug, Deserialize)]
struct ChangeData {
    schema: String,
    table: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

/// Extract the row change from a frame, if it carries one
///
/// Relevance and completeness are judged by the subscriber, so any change
/// frame is passed through.
pub fn decode_change(frame: &PhoenixFrame) -> Option<FeedChange> {
    if frame.event != "postgres_changes" {
        return None;
    }
    let data = frame.payload.get("data")?;
    let data = match ChangeData::deserialize(data) {
        Ok(data) => data,
        Err(e) => {
            warn!(topic = %frame.topic, error = %e, "Unreadable change payload");
            return None;
        }
    };

    Some(FeedChange {
        schema: data.schema,
        table: data.table,
        kind: ChangeKind::parse(&data.kind),
        record: data.record,
        old_record: data.old_record.filter(|old| !old.is_null()),
    })
}

// ----------------------------------------------------------------------------
// Realtime Feed
// ----------------------------------------------------------------------------

struct Connection {
    topic: String,
    writer: mpsc::Sender<WsMessage>,
    writer_task: JoinHandle<()>,
    /// Reader and heartbeat
    tasks: Vec<JoinHandle<()>>,
}

pub struct RealtimeFeed {
    config: SupabaseConfig,
    sessions: SessionStore,
    feed_buffer_size: usize,
    refs: Arc<AtomicU64>,
    connections: Mutex<HashMap<SubscriptionId, Connection>>,
}

impl RealtimeFeed {
    pub fn new(config: &SupabaseConfig, sessions: SessionStore, feed_buffer_size: usize) -> Self {
        Self {
            config: config.clone(),
            sessions,
            feed_buffer_size,
            refs: Arc::new(AtomicU64::new(1)),
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn next_ref(&self) -> u64 {
        self.refs.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn connect(&self) -> SupabaseResult<FeedHandle> {
        let url = self.config.realtime_url()?;
        let topic = self.config.realtime_topic();
        info!(topic = %topic, "Connecting to realtime");

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let access_token = self.sessions.access_token().await;
        let join_ref = self.next_ref();
        let join = PhoenixFrame::join(&self.config, access_token.as_deref(), join_ref);
        write.send(join.to_message()?).await?;

        let reply = tokio::time::timeout(
            self.config.request_timeout(),
            await_reply(&mut read, &topic, join_ref),
        )
        .await
        .map_err(|_| SupabaseError::JoinRejected("timed out waiting for join reply".to_string()))??;
        if reply.reply_status() != Some("ok") {
            return Err(SupabaseError::JoinRejected(reply.payload.to_string()));
        }
        info!(topic = %topic, "Joined realtime channel");

        // Writer task owns the sink; everything else goes through the channel
        let (writer, mut writer_rx) = mpsc::channel::<WsMessage>(WRITER_BUFFER);
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = writer_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    debug!(error = %e, "Realtime socket write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let heartbeat_writer = writer.clone();
        let heartbeat_refs = self.refs.clone();
        let heartbeat_interval = self.config.heartbeat_interval();
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = interval(heartbeat_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reference = heartbeat_refs.fetch_add(1, Ordering::Relaxed);
                let Ok(msg) = PhoenixFrame::heartbeat(reference).to_message() else {
                    continue;
                };
                if heartbeat_writer.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let (changes, handle) = FeedHandle::channel(self.feed_buffer_size);
        let reader_writer = writer.clone();
        let reader_topic = topic.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        let frame: PhoenixFrame = match serde_json::from_str(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(error = %e, "Ignoring unparseable realtime frame");
                                continue;
                            }
                        };
                        if let Some(change) = decode_change(&frame) {
                            if changes.send(change).await.is_err() {
                                debug!("Feed handle dropped, stopping reader");
                                break;
                            }
                            continue;
                        }
                        match frame.event.as_str() {
                            "phx_error" | "phx_close" if frame.topic == reader_topic => {
                                warn!(event = %frame.event, "Realtime channel closed by server");
                                break;
                            }
                            "phx_reply" if frame.reply_status() == Some("error") => {
                                warn!(payload = %frame.payload, "Realtime request failed");
                            }
                            _ => debug!(event = %frame.event, topic = %frame.topic, "Realtime frame"),
                        }
                    }
                    Ok(WsMessage::Ping(data)) => {
                        let _ = reader_writer.send(WsMessage::Pong(data)).await;
                    }
                    Ok(WsMessage::Close(_)) => {
                        info!("Realtime socket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Realtime socket error");
                        break;
                    }
                }
            }
        });

        self.connections.lock().await.insert(
            handle.id(),
            Connection {
                topic,
                writer,
                writer_task,
                tasks: vec![reader_task, heartbeat_task],
            },
        );
        Ok(handle)
    }

    pub async fn disconnect(&self, handle: FeedHandle) -> SupabaseResult<()> {
        let id = handle.id();
        drop(handle);

        let Some(connection) = self.connections.lock().await.remove(&id) else {
            debug!(subscription = %id, "Realtime connection already gone");
            return Ok(());
        };

        for task in &connection.tasks {
            task.abort();
        }

        let leave = PhoenixFrame::leave(&connection.topic, self.next_ref()).to_message()?;
        let _ = connection.writer.send(leave).await;
        drop(connection.writer);

        let mut writer_task = connection.writer_task;
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task)
            .await
            .is_err()
        {
            writer_task.abort();
        }
        info!(topic = %connection.topic, "Left realtime channel");
        Ok(())
    }
}

/// Read frames until the reply to `reference` on `topic` arrives
async fn await_reply<S>(read: &mut S, topic: &str, reference: u64) -> SupabaseResult<PhoenixFrame>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let reference = reference.to_string();
    while let Some(msg) = read.next().await {
        if let WsMessage::Text(text) = msg? {
            let frame: PhoenixFrame = serde_json::from_str(&text)?;
            if frame.event == "phx_reply"
                && frame.topic == topic
                && frame.reference.as_deref() == Some(reference.as_str())
            {
                return Ok(frame);
            }
        }
    }
    Err(SupabaseError::JoinRejected(
        "socket closed before join reply".to_string(),
    ))
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        if let Ok(connections) = self.connections.try_lock() {
            for connection in connections.values() {
                connection.writer_task.abort();
                for task in &connection.tasks {
                    task.abort();
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl PushFeed for RealtimeFeed {
    async fn open(&self) -> ChatResult<FeedHandle> {
        self.connect()
            .await
            .map_err(|e| transport(e, |reason| TransportError::FeedOpenFailed { reason }))
    }

    async fn close(&self, handle: FeedHandle) -> ChatResult<()> {
        self.disconnect(handle)
            .await
            .map_err(|e| transport(e, |reason| TransportError::FeedClosed { reason }))
    }
}
