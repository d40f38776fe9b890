// WebSocket chat channel
// Relays "my event" messages from any client to every client as "my response"

use crate::chat::{ChatStore, Envelope, RelayOutcome, INBOUND_EVENT, OUTBOUND_EVENT};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use super::server::AppState;

const HEARTBEAT_SECS: u64 = 30;

/// Chat connection entry
#[derive(Debug)]
pub struct ChatConnection {
    pub tx: mpsc::UnboundedSender<Message>,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

/// Shared chat state: live connections plus the message log
#[derive(Clone)]
pub struct ChatState {
    connections: Arc<RwLock<HashMap<u64, ChatConnection>>>,
    next_id: Arc<AtomicU64>,
    store: ChatStore,
}

impl ChatState {
    pub fn new(store: ChatStore) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            store,
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn register(&self, tx: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = ChatConnection {
            tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(id, conn);
        id
    }

    async fn unregister(&self, id: u64) {
        if let Some(conn) = self.connections.write().await.remove(&id) {
            let seconds = (chrono::Utc::now() - conn.connected_at).num_seconds();
            tracing::info!(connection = id, seconds = seconds, "Chat client disconnected");
        }
    }

    /// Send an envelope to every connected client. Returns how many got it.
    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let text = match serde_json::to_string(envelope) {
            Ok(text) => text,
            Err(e) => {
                crate::log_error!(e, "serializing chat envelope");
                return 0;
            },
        };

        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|conn| conn.tx.send(Message::Text(text.clone())).is_ok())
            .count()
    }

    /// Handle one text frame from a client.
    ///
    /// Every `"my event"` envelope is relayed whatever its data looks like.
    /// Other events and unparseable frames are logged and dropped.
    pub async fn handle_text(&self, text: &str) -> Option<RelayOutcome> {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Failed to parse chat envelope: {}", e);
                return None;
            },
        };

        if envelope.event != INBOUND_EVENT {
            tracing::debug!(event = envelope.event.as_str(), "Ignoring chat event");
            return None;
        }

        let outcome = self.store.relay(envelope.data).await;
        let delivered = self
            .broadcast(&Envelope {
                event: OUTBOUND_EVENT.to_string(),
                data: outcome.data.clone(),
            })
            .await;
        crate::log_chat_operation!("broadcast", delivered);

        Some(outcome)
    }
}

/// Upgrade `/socket` to the chat channel
pub async fn handle_chat_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state.chat))
}

async fn handle_chat_socket(socket: WebSocket, state: ChatState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Forward queued messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let conn_id = state.register(tx.clone()).await;
    tracing::info!(connection = conn_id, "Chat client connected");

    let heartbeat_tx = tx;
    let mut heartbeat_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(HEARTBEAT_SECS));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if heartbeat_tx.send(Message::Ping(Vec::new())).is_err() {
                break;
            }
            tracing::trace!("Sent heartbeat ping to chat client");
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    recv_state.handle_text(&text).await;
                },
                Message::Close(_) => {
                    break;
                },
                _ => {},
            }
        }
    });

    // Wait for any task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            heartbeat_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
            heartbeat_task.abort();
        }
        _ = (&mut heartbeat_task) => {
            send_task.abort();
            recv_task.abort();
        }
    }

    state.unregister(conn_id).await;
}
