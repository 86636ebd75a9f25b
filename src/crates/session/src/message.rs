//! The persisted chat `Message`: append-only inside a chat; deletion is
//! supported but never reorders the remaining sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Present only on assistant messages that propose graph mutations: the
    /// raw Format E `<operations>` block text.
    pub operations: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(chat_id: impl Into<String>, role: MessageRole, content: impl Into<String>, operations: Option<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            chat_id: chat_id.into(),
            role,
            content: content.into(),
            operations,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only per-chat message log. `delete` removes an entry from
/// `visible()` without shifting the positions of the messages around it —
/// backed by a tombstone set rather than a `Vec::remove`.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    deleted: std::collections::HashSet<Uuid>,
}

impl ChatLog {
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn delete(&mut self, message_id: Uuid) {
        self.deleted.insert(message_id);
    }

    pub fn visible(&self) -> Vec<&ChatMessage> {
        self.messages.iter().filter(|m| !self.deleted.contains(&m.message_id)).collect()
    }

    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_n(&self, chat_id: &str, n: usize) -> Vec<&ChatMessage> {
        let matching: Vec<&ChatMessage> = self.visible().into_iter().filter(|m| m.chat_id == chat_id).collect();
        let start = matching.len().saturating_sub(n);
        matching[start..].to_vec()
    }
}
