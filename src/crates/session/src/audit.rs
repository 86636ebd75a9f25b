//! Audit log entries: the only bit-exact persisted artifact the core owns
//! directly is `diff` — a Format E operations-block
//! string. Everything else about where entries live is delegated to the
//! long-term store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// An operations block was validated and applied to the store.
    ApplyDiff,
    /// A persistence call wrote every dirty item.
    Persist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub workspace_id: String,
    pub system_id: String,
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    pub action: AuditAction,
    pub diff: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        workspace_id: impl Into<String>,
        system_id: impl Into<String>,
        chat_id: Option<String>,
        user_id: Option<String>,
        action: AuditAction,
        diff: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.into(),
            system_id: system_id.into(),
            chat_id,
            user_id,
            action,
            diff: diff.into(),
            timestamp: Utc::now(),
        }
    }
}
