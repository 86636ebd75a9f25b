//! Reconnecting WebSocket client: waits for `connected`, subscribes, and
//! on disconnect retries with exponential
//! backoff up to 5 attempts, re-subscribing on success.

use crate::error::{BroadcastError, Result};
use crate::message::Envelope;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const MAX_RECONNECT_ATTEMPTS: usize = 5;
const BASE_RECONNECT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ClientSubscription {
    pub workspace_id: String,
    pub system_id: String,
    pub user_id: String,
}

/// A handler invoked for every `graph_update` / `chat_update` envelope the
/// client receives. Registered once at construction.
pub trait UpdateHandler: Send + Sync {
    fn on_update(&self, envelope: Envelope);
}

impl<F: Fn(Envelope) + Send + Sync> UpdateHandler for F {
    fn on_update(&self, envelope: Envelope) {
        self(envelope)
    }
}

pub struct BroadcastClient {
    url: String,
    subscription: ClientSubscription,
    handler: Box<dyn UpdateHandler>,
}

impl BroadcastClient {
    pub fn new(url: impl Into<String>, subscription: ClientSubscription, handler: impl UpdateHandler + 'static) -> Self {
        Self { url: url.into(), subscription, handler: Box::new(handler) }
    }

    /// Connect, subscribe, and process incoming envelopes until the socket
    /// closes or a fatal error occurs. Does not reconnect itself — callers
    /// drive [`Self::run_with_reconnect`] for that, or call this in a loop.
    async fn run_once(&self) -> Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut sink, mut stream) = ws_stream.split();

        // Wait for `connected` before subscribing, per spec.
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let envelope: Envelope = serde_json::from_str(&text)?;
                    if matches!(envelope, Envelope::Connected { .. }) {
                        break;
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(BroadcastError::ChannelClosed),
            }
        }

        let subscribe = Envelope::Subscribe {
            workspace_id: self.subscription.workspace_id.clone(),
            system_id: self.subscription.system_id.clone(),
            user_id: self.subscription.user_id.clone(),
        };
        sink.send(WsMessage::Text(serde_json::to_string(&subscribe)?)).await?;

        while let Some(message) = stream.next().await {
            let WsMessage::Text(text) = message? else { continue };
            let envelope: Envelope = serde_json::from_str(&text)?;
            match envelope {
                Envelope::GraphUpdate { .. } | Envelope::ChatUpdate { .. } => self.handler.on_update(envelope),
                Envelope::Ping => {
                    sink.send(WsMessage::Text(serde_json::to_string(&Envelope::Pong)?)).await?;
                }
                Envelope::Shutdown { .. } => break,
                Envelope::Connected { .. } | Envelope::Subscribed { .. } | Envelope::Subscribe { .. }
                | Envelope::Unsubscribe | Envelope::Pong => {}
            }
        }

        Ok(())
    }

    /// Run forever, reconnecting with `delay = base * attemptNumber` on any
    /// disconnect, up to [`MAX_RECONNECT_ATTEMPTS`]. A client that exhausts
    /// its attempts MUST perform a full reload from the authoritative store
    /// once it does reconnect — that reload is the caller's responsibility,
    /// not this client's.
    pub async fn run_with_reconnect(&self) -> Result<()> {
        let mut attempt = 0usize;
        loop {
            match self.run_once().await {
                Ok(()) => {
                    attempt = 0;
                    continue;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > MAX_RECONNECT_ATTEMPTS {
                        return Err(BroadcastError::ReconnectExhausted(MAX_RECONNECT_ATTEMPTS));
                    }
                    tracing::warn!(attempt, error = %e, "broadcast client disconnected, retrying");
                    tokio::time::sleep(BASE_RECONNECT_DELAY * attempt as u32).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn update_handler_blanket_impl_wraps_a_closure() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handler: Box<dyn UpdateHandler> = Box::new(move |_: Envelope| {
            count2.fetch_add(1, Ordering::Relaxed);
        });
        handler.on_update(Envelope::Unsubscribe);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn reconnect_delay_scales_linearly_with_attempt_number() {
        assert_eq!(BASE_RECONNECT_DELAY * 1, Duration::from_millis(500));
        assert_eq!(BASE_RECONNECT_DELAY * 5, Duration::from_millis(2500));
    }
}
