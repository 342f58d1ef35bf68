// gun.rs — Gun relay peer over WebSocket.
//
// Writes are applied to a local mirror first, then sent to the relay as
// `put` messages and not awaited. Reads ask the relay with a `get` message
// and wait briefly for the `@`-correlated reply; on timeout the mirror
// answers. Anything the relay pushes is merged into the mirror when its
// per-field state is newer than what the mirror holds.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::{GraphStore, MemoryStore, Node, StoreError, META_KEY};

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// Time allowed for the WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time `close()` waits for queued writes to reach the relay.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct GunRelayStore {
    mirror: MemoryStore,
    sender: mpsc::Sender<Message>,
    pending: Pending,
    get_timeout: Duration,
    shutdown: Mutex<Option<(mpsc::Sender<()>, JoinHandle<()>)>>,
}

// ── helpers (also used by tests) ────────────────────────────────────

/// Map the relay's HTTP URL (as configured for browsers) to its WebSocket URL.
pub fn websocket_url(relay_url: &str) -> Result<String, StoreError> {
    let mut url = Url::parse(relay_url)
        .map_err(|e| StoreError::Connection(format!("bad relay URL: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(StoreError::Connection(format!(
                "unsupported relay scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| StoreError::Connection("cannot set relay scheme".into()))?;
    Ok(url.to_string())
}

fn message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Build a `put` message: node fields plus HAM state (one timestamp per field).
fn build_put(msg_id: &str, soul: &str, fields: &Node, state_ms: i64) -> Value {
    let mut node = Map::new();
    let states: Map<String, Value> = fields
        .keys()
        .filter(|k| k.as_str() != META_KEY)
        .map(|k| (k.clone(), json!(state_ms)))
        .collect();
    node.insert(META_KEY.into(), json!({ "#": soul, ">": states }));
    for (k, v) in fields {
        if k != META_KEY {
            node.insert(k.clone(), v.clone());
        }
    }
    json!({
        "#": msg_id,
        "put": { soul: Value::Object(node) }
    })
}

fn build_get(msg_id: &str, soul: &str) -> Value {
    json!({
        "#": msg_id,
        "get": { "#": soul }
    })
}

/// The relay may batch several messages into one JSON array frame.
fn split_frame(text: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items,
        Ok(v @ Value::Object(_)) => vec![v],
        Ok(_) => Vec::new(),
        Err(e) => {
            log::debug!("Ignoring non-JSON relay frame: {e}");
            Vec::new()
        }
    }
}

/// Every `(soul, node)` carried by a message's `put` section.
fn put_nodes(msg: &Value) -> Vec<(String, Node)> {
    let Some(put) = msg.get("put").and_then(|p| p.as_object()) else {
        return Vec::new();
    };
    put.iter()
        .filter_map(|(soul, node)| Some((soul.clone(), node.as_object()?.clone())))
        .collect()
}

fn route_incoming(text: &str, mirror: &MemoryStore, pending: &Pending) {
    for msg in split_frame(text) {
        for (soul, node) in put_nodes(&msg) {
            mirror.merge_remote(&soul, node);
        }
        if let Some(reply_to) = msg.get("@").and_then(|v| v.as_str()) {
            let waiter = pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(reply_to);
            if let Some(tx) = waiter {
                let _ = tx.send(msg.clone());
            }
        }
        if let Some(err) = msg.get("err").and_then(|v| v.as_str()) {
            log::warn!("Relay error: {err}");
        }
    }
}

impl GunRelayStore {
    /// Connect to a relay, e.g. `http://localhost:8765/gun`.
    pub async fn connect(relay_url: &str, get_timeout: Duration) -> Result<Self, StoreError> {
        Self::connect_with_timeout(relay_url, get_timeout, CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        relay_url: &str,
        get_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let ws_url = websocket_url(relay_url)?;
        let (ws_stream, _response) =
            tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(ws_url.as_str()))
                .await
                .map_err(|_| {
                    StoreError::Connection(format!(
                        "WebSocket connect: no answer within {}ms",
                        connect_timeout.as_millis()
                    ))
                })?
                .map_err(|e| StoreError::Connection(format!("WebSocket connect: {e}")))?;
        log::info!("Connected to relay {}", ws_url);

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        // Channel: caller → WebSocket sink
        let (send_tx, mut send_rx) = mpsc::channel::<Message>(256);
        // Channel: close signal
        let (close_tx, mut close_rx) = mpsc::channel::<()>(1);

        let mirror = MemoryStore::new();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        // Writer task. Queued writes go out before the close frame.
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = send_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if ws_sink.send(msg).await.is_err() {
                            log::warn!("Relay write failed; writer stopping");
                            return;
                        }
                    }
                    _ = close_rx.recv() => {
                        send_rx.close();
                        while let Some(msg) = send_rx.recv().await {
                            if ws_sink.send(msg).await.is_err() {
                                log::warn!("Relay write failed while flushing");
                                return;
                            }
                        }
                        break;
                    }
                }
            }
            let _ = ws_sink.send(Message::Close(None)).await;
        });

        // Reader task
        let reader_mirror = mirror.clone();
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_source.next().await {
                if let Message::Text(text) = msg {
                    route_incoming(&text, &reader_mirror, &reader_pending);
                }
            }
            log::info!("Relay connection closed");
            // Wake anyone still waiting so they fall back to the mirror.
            reader_pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        });

        Ok(Self {
            mirror,
            sender: send_tx,
            pending,
            get_timeout,
            shutdown: Mutex::new(Some((close_tx, writer))),
        })
    }

    async fn send(&self, msg: Value) -> Result<(), StoreError> {
        self.sender
            .send(Message::Text(msg.to_string().into()))
            .await
            .map_err(|_| StoreError::Closed)
    }

    /// Flush queued writes, then close the connection. Later writes fail
    /// with [`StoreError::Closed`].
    pub async fn close(&self) {
        let shutdown = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some((close_tx, writer)) = shutdown else {
            return;
        };
        let _ = close_tx.send(()).await;
        match tokio::time::timeout(FLUSH_TIMEOUT, writer).await {
            Ok(Ok(())) => log::debug!("Relay writes flushed"),
            Ok(Err(e)) => log::warn!("Relay writer ended abnormally: {e}"),
            Err(_) => log::warn!("Relay flush timed out; pending writes dropped"),
        }
    }
}

#[async_trait]
impl GraphStore for GunRelayStore {
    async fn put(&self, soul: &str, fields: Node) -> Result<(), StoreError> {
        let state = chrono::Utc::now().timestamp_millis();
        let msg = build_put(&message_id(), soul, &fields, state);
        self.mirror.write(soul, fields, state as f64);
        self.send(msg).await
    }

    async fn get(&self, soul: &str) -> Result<Option<Node>, StoreError> {
        let id = message_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), tx);

        if let Err(e) = self.send(build_get(&id, soul)).await {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            log::warn!("Relay get {} not sent: {}", soul, e);
            return Ok(self.mirror.snapshot(soul));
        }

        // The reader task has already merged the reply into the mirror.
        match tokio::time::timeout(self.get_timeout, rx).await {
            Ok(_) => {}
            Err(_) => {
                self.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);
                log::debug!("Relay get {} timed out, answering from mirror", soul);
            }
        }
        Ok(self.mirror.snapshot(soul))
    }

    fn name(&self) -> &str {
        "gun-relay"
    }
}

// ── Tests ───────────────────────────────────────────────────────────
