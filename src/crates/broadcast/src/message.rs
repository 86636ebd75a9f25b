//! The closed WebSocket message vocabulary. JSON-encoded, tagged on
//! `type`, field names in camelCase to match the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOrigin {
    UserEdit,
    LlmOperation,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSource {
    pub user_id: String,
    pub session_id: String,
    pub origin: UpdateOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub workspace_id: String,
    pub system_id: String,
    pub user_id: String,
}

impl Subscription {
    pub fn matches(&self, workspace_id: &str, system_id: &str) -> bool {
        self.workspace_id == workspace_id && self.system_id == system_id
    }
}

/// The closed set of envelopes exchanged over the broadcast socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Connected { client_id: String, timestamp: DateTime<Utc> },
    Subscribe { workspace_id: String, system_id: String, user_id: String },
    Subscribed { subscription: Subscription, timestamp: DateTime<Utc> },
    Unsubscribe,
    Ping,
    Pong,
    GraphUpdate { diff: String, source: UpdateSource, timestamp: DateTime<Utc> },
    ChatUpdate { diff: String, source: UpdateSource, timestamp: DateTime<Utc> },
    Shutdown { timestamp: DateTime<Utc> },
}

impl Envelope {
    /// The `(workspaceId, systemId)` the broadcast fan-out should filter
    /// on, for the two envelope kinds that carry graph state.
    pub fn update_diff(&self) -> Option<(&str, &UpdateSource)> {
        match self {
            Envelope::GraphUpdate { diff, source, .. } | Envelope::ChatUpdate { diff, source, .. } => {
                Some((diff, source))
            }
            _ => None,
        }
    }
}
