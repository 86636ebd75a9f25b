//! The long-term store contract: a labeled-property graph database that
//! sits outside the core and whose save/load interface we
//! specify as an async trait, with an in-memory reference implementation
//! for tests and default local operation — a trait-plus-in-memory-backend
//! shape familiar from checkpoint-saver designs elsewhere.

use crate::audit::AuditLogEntry;
use crate::message::ChatMessage;
use async_trait::async_trait;
use graph_core::{Edge, Node};
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend not connected")]
    NotConnected,

    #[error("no workspace {workspace_id:?}/{system_id:?} in the store")]
    WorkspaceNotFound { workspace_id: String, system_id: String },

    #[error("backend I/O error: {0}")]
    Io(String),
}

/// What a fresh process restores on start: the node/edge maps and,
/// optionally, chat history if the backend tracks it.
#[derive(Debug, Clone, Default)]
pub struct LoadedWorkspace {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub messages: Option<Vec<ChatMessage>>,
}

/// The save/load surface the Session Orchestrator consumes from the
/// long-term persistence store. `connect`/`close` bracket
/// the backend's own connection lifecycle (pool setup/teardown for a real
/// graph database); the in-memory reference implementation treats both as
/// no-ops.
#[async_trait]
pub trait GraphStoreBackend: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    async fn load_workspace(&self, workspace_id: &str, system_id: &str) -> Result<LoadedWorkspace>;

    async fn save_nodes(&self, workspace_id: &str, system_id: &str, nodes: &[Node]) -> Result<()>;
    async fn save_edges(&self, workspace_id: &str, system_id: &str, edges: &[Edge]) -> Result<()>;
    async fn save_messages(&self, workspace_id: &str, system_id: &str, messages: &[ChatMessage]) -> Result<()>;

    async fn create_audit_log(&self, entry: AuditLogEntry) -> Result<()>;
}

/// Reference implementation: every workspace/system pair's nodes, edges,
/// and messages live in process memory. Used for tests and default local
/// operation when no real graph database is configured.
#[derive(Default)]
pub struct InMemoryBackend {
    workspaces: Mutex<BTreeMap<(String, String), LoadedWorkspace>>,
    audit_log: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded in the audit log so far, for tests.
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphStoreBackend for InMemoryBackend {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn load_workspace(&self, workspace_id: &str, system_id: &str) -> Result<LoadedWorkspace> {
        let key = (workspace_id.to_string(), system_id.to_string());
        Ok(self.workspaces.lock().unwrap().get(&key).cloned().unwrap_or_default())
    }

    async fn save_nodes(&self, workspace_id: &str, system_id: &str, nodes: &[Node]) -> Result<()> {
        let key = (workspace_id.to_string(), system_id.to_string());
        let mut guard = self.workspaces.lock().unwrap();
        let entry = guard.entry(key).or_default();
        for node in nodes {
            if let Some(existing) = entry.nodes.iter_mut().find(|n| n.semantic_id == node.semantic_id) {
                *existing = node.clone();
            } else {
                entry.nodes.push(node.clone());
            }
        }
        Ok(())
    }

    async fn save_edges(&self, workspace_id: &str, system_id: &str, edges: &[Edge]) -> Result<()> {
        let key = (workspace_id.to_string(), system_id.to_string());
        let mut guard = self.workspaces.lock().unwrap();
        let entry = guard.entry(key).or_default();
        for edge in edges {
            if let Some(existing) = entry.edges.iter_mut().find(|e| e.key() == edge.key()) {
                *existing = edge.clone();
            } else {
                entry.edges.push(edge.clone());
            }
        }
        Ok(())
    }

    async fn save_messages(&self, workspace_id: &str, system_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let key = (workspace_id.to_string(), system_id.to_string());
        let mut guard = self.workspaces.lock().unwrap();
        let entry = guard.entry(key).or_default();
        let existing = entry.messages.get_or_insert_with(Vec::new);
        for message in messages {
            existing.push(message.clone());
        }
        Ok(())
    }

    async fn create_audit_log(&self, entry: AuditLogEntry) -> Result<()> {
        self.audit_log.lock().unwrap().push(entry);
        Ok(())
    }
}
