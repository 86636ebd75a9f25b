//! The broadcast hub: one axum WebSocket endpoint serving every connected
//! client, scoped by `(workspaceId, systemId)` subscription. Connection
//! bookkeeping follows a plain connection-pool shape: a concurrent table
//! of client senders plus per-pair replay buffers.

use crate::message::{Envelope, Subscription};
use crate::replay::ReplayBuffer;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

const SHUTDOWN_DRAIN: Duration = Duration::from_millis(300);
const REPLAY_BUFFER_CAPACITY: usize = 100;

struct ClientHandle {
    subscription: parking_lot::Mutex<Option<Subscription>>,
    sender: mpsc::UnboundedSender<WsMessage>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BroadcastStats {
    pub active_connections: usize,
    pub total_connections: u64,
}

/// Shared server state; cloneable handle over the actual bookkeeping.
pub struct BroadcastServer {
    clients: DashMap<String, Arc<ClientHandle>>,
    replay_buffers: DashMap<(String, String), Arc<ReplayBuffer>>,
    total_created: AtomicU64,
    shutting_down: AtomicBool,
}

impl BroadcastServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: DashMap::new(),
            replay_buffers: DashMap::new(),
            total_created: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/ws", get(ws_handler)).with_state(self)
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats { active_connections: self.clients.len(), total_connections: self.total_created.load(Ordering::Relaxed) }
    }

    fn replay_buffer(&self, workspace_id: &str, system_id: &str) -> Arc<ReplayBuffer> {
        self.replay_buffers
            .entry((workspace_id.to_string(), system_id.to_string()))
            .or_insert_with(|| Arc::new(ReplayBuffer::new(REPLAY_BUFFER_CAPACITY)))
            .clone()
    }

    /// Best-effort replay of updates recorded since `from_sequence` for one
    /// `(workspaceId, systemId)`. Empty means either nothing happened or the
    /// buffer has scrolled past it; the caller falls back to a full reload.
    pub fn replay_since(&self, workspace_id: &str, system_id: &str, from_sequence: u64) -> Vec<Envelope> {
        self.replay_buffer(workspace_id, system_id).since(from_sequence)
    }

    /// Broadcast `envelope` to every client whose subscription matches
    /// `(workspaceId, systemId)`, skipping only `exclude_client_id` (the
    /// originating socket) — same-user different-session clients still
    /// receive it.
    pub fn broadcast_update(&self, workspace_id: &str, system_id: &str, envelope: Envelope, exclude_client_id: &str) {
        self.replay_buffer(workspace_id, system_id).record(envelope.clone());
        self.fan_out(workspace_id, system_id, &envelope, Some(exclude_client_id));
    }

    fn fan_out(&self, workspace_id: &str, system_id: &str, envelope: &Envelope, exclude_client_id: Option<&str>) {
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            let client_id = entry.key();
            if Some(client_id.as_str()) == exclude_client_id {
                continue;
            }
            let matches = match entry.value().subscription.lock().as_ref() {
                Some(sub) => sub.matches(workspace_id, system_id),
                None => false,
            };
            if !matches {
                continue;
            }
            if let Err(e) = send_envelope(&entry.value().sender, envelope) {
                tracing::warn!(client_id = %client_id, error = %e, "dropping client after send failure");
                dead.push(client_id.clone());
            }
        }
        for client_id in dead {
            self.clients.remove(&client_id);
        }
    }

    /// Fan out `shutdown` to every client regardless of subscription, wait
    /// for the drain window, then let callers close the listening socket.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let envelope = Envelope::Shutdown { timestamp: Utc::now() };
        for entry in self.clients.iter() {
            let _ = send_envelope(&entry.value().sender, &envelope);
        }
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        self.clients.clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

fn send_envelope(sender: &mpsc::UnboundedSender<WsMessage>, envelope: &Envelope) -> Result<(), crate::error::BroadcastError> {
    let text = serde_json::to_string(envelope)?;
    sender.send(WsMessage::Text(text)).map_err(|_| crate::error::BroadcastError::ChannelClosed)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<BroadcastServer>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<BroadcastServer>, socket: WebSocket) {
    let client_id = Uuid::new_v4().to_string();
    state.total_created.fetch_add(1, Ordering::Relaxed);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let handle = Arc::new(ClientHandle { subscription: parking_lot::Mutex::new(None), sender: tx });
    state.clients.insert(client_id.clone(), handle.clone());

    let forward = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let _ = send_envelope(&handle.sender, &Envelope::Connected { client_id: client_id.clone(), timestamp: Utc::now() });

    while let Some(Ok(message)) = stream.next().await {
        let WsMessage::Text(text) = message else { continue };
        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "malformed envelope from client");
                continue;
            }
        };

        match envelope {
            Envelope::Subscribe { workspace_id, system_id, user_id } => {
                let subscription = Subscription { workspace_id, system_id, user_id };
                *handle.subscription.lock() = Some(subscription.clone());
                let _ = send_envelope(&handle.sender, &Envelope::Subscribed { subscription, timestamp: Utc::now() });
            }
            Envelope::Unsubscribe => {
                *handle.subscription.lock() = None;
            }
            Envelope::Ping => {
                let _ = send_envelope(&handle.sender, &Envelope::Pong);
            }
            Envelope::GraphUpdate { .. } | Envelope::ChatUpdate { .. } => {
                if let Some((workspace_id, system_id)) = handle
                    .subscription
                    .lock()
                    .as_ref()
                    .map(|s| (s.workspace_id.clone(), s.system_id.clone()))
                {
                    state.broadcast_update(&workspace_id, &system_id, envelope, &client_id);
                }
            }
            Envelope::Connected { .. } | Envelope::Subscribed { .. } | Envelope::Pong | Envelope::Shutdown { .. } => {
                // Server-to-client-only envelopes; a client sending one is ignored.
            }
        }
    }

    state.clients.remove(&client_id);
    forward.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{UpdateOrigin, UpdateSource};

    fn update(session_id: &str) -> Envelope {
        Envelope::GraphUpdate {
            diff: "+ A.FUNC.001|x".into(),
            source: UpdateSource { user_id: "u1".into(), session_id: session_id.into(), origin: UpdateOrigin::UserEdit },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn stats_start_at_zero() {
        let server = BroadcastServer::new();
        let stats = server.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_connections, 0);
    }

    #[test]
    fn broadcast_update_records_into_the_replay_buffer() {
        let server = BroadcastServer::new();
        server.broadcast_update("ws1", "sys1", update("origin-session"), "origin-session");
        let replay = server.replay_since("ws1", "sys1", 0);
        assert_eq!(replay.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_marks_server_as_shutting_down() {
        let server = BroadcastServer::new();
        assert!(!server.is_shutting_down());
        server.shutdown().await;
        assert!(server.is_shutting_down());
    }
}
