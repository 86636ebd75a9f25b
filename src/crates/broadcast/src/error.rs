//! Error types for the broadcast server and client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BroadcastError>;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),

    #[error("client {0} is not subscribed")]
    NotSubscribed(String),

    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(usize),

    #[error("client channel closed")]
    ChannelClosed,
}
