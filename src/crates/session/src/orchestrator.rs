//! The Session Orchestrator: owns the Unified Data Service for one
//! `(workspaceId, systemId)`, routes every user turn
//! between the LLM Engine and the slash-command subsystems, applies
//! diffs atomically, and persists only on explicit `/save` or shutdown.

use crate::audit::{AuditAction, AuditLogEntry};
use crate::commands::{self, SlashCommand, HELP_TEXT};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::message::{ChatLog, ChatMessage, MessageRole};
use crate::store::GraphStoreBackend;
use broadcast::{BroadcastServer, Envelope, UpdateOrigin, UpdateSource};
use canvas::{CanvasController, RenderData};
use data_service::UnifiedDataService;
use graph_core::GraphStats;
use llm::{Chunk, Engine, EngineRequest};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

/// What one call to [`SessionOrchestrator::handle_line`] produces.
pub enum TurnOutcome {
    /// A slash-command the orchestrator or canvas handled locally.
    Command(String),
    /// The line was routed to the LLM Engine; chunks arrive on `rx` as
    /// they stream, terminated by a [`Chunk::Complete`].
    Streaming(mpsc::Receiver<Chunk>),
}

/// Ties the Unified Data Service, Canvas Controller, LLM Engine,
/// broadcast bus, chat log, and long-term store together for one active
/// workspace/system session.
pub struct SessionOrchestrator {
    config: SessionConfig,
    session_id: String,
    user_id: String,
    chat_id: String,
    data: Arc<UnifiedDataService>,
    canvas: AsyncMutex<CanvasController>,
    engine: Engine,
    broadcast: Arc<BroadcastServer>,
    backend: Arc<dyn GraphStoreBackend>,
    chat_log: AsyncMutex<ChatLog>,
}

impl SessionOrchestrator {
    /// Restores state from the long-term store and wires up a fresh
    /// `SessionOrchestrator`.
    pub async fn start(
        config: SessionConfig,
        backend: Arc<dyn GraphStoreBackend>,
        broadcast: Arc<BroadcastServer>,
        engine: Engine,
        user_id: impl Into<String>,
    ) -> Result<Self> {
        backend.connect().await.map_err(|e| SessionError::Store(e.to_string()))?;

        let loaded = backend
            .load_workspace(&config.workspace_id, &config.system_id)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;

        let data = data_service::unified_data_service(&config.workspace_id, &config.system_id);
        let store = data.store();
        for node in loaded.nodes {
            store.set_node(node, true)?;
        }
        for edge in loaded.edges {
            store.set_edge(edge, true)?;
        }
        // What we just restored is, by definition, already durable.
        store.mark_persisted(store.get_version());

        let mut chat_log = ChatLog::default();
        for message in loaded.messages.unwrap_or_default() {
            chat_log.append(message);
        }

        let canvas = CanvasController::new(store.clone());

        Ok(Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            chat_id: format!("{}:{}", config.workspace_id, config.system_id),
            config,
            data,
            canvas: AsyncMutex::new(canvas),
            engine,
            broadcast,
            backend,
            chat_log: AsyncMutex::new(chat_log),
        })
    }

    pub fn workspace_id(&self) -> &str {
        &self.config.workspace_id
    }

    pub fn system_id(&self) -> &str {
        &self.config.system_id
    }

    pub fn stats(&self) -> GraphStats {
        self.data.stats()
    }

    /// Route one line of user input. Slash-commands resolve synchronously;
    /// anything else spawns a streamed LLM Engine turn that runs
    /// concurrently with the caller draining `rx`.
    pub async fn handle_line(self: &Arc<Self>, line: &str) -> Result<TurnOutcome> {
        match commands::parse(line) {
            Some(SlashCommand::Exit) => Ok(TurnOutcome::Command("exiting".to_string())),
            Some(SlashCommand::Help) => Ok(TurnOutcome::Command(HELP_TEXT.to_string())),
            Some(SlashCommand::Stats) => {
                let stats = self.stats();
                Ok(TurnOutcome::Command(format!(
                    "nodes={} edges={} version={} dirty={}",
                    stats.node_count, stats.edge_count, stats.version, stats.dirty_count
                )))
            }
            Some(SlashCommand::Save) | Some(SlashCommand::Commit) => {
                let stats = self.persist().await?;
                Ok(TurnOutcome::Command(format!("persisted {} dirty item(s)", stats)))
            }
            Some(SlashCommand::Canvas(raw)) => {
                let mut canvas = self.canvas.lock().await;
                let data = canvas.handle_command(&raw)?;
                Ok(TurnOutcome::Command(data.ascii))
            }
            None => {
                let (tx, rx) = mpsc::channel(64);
                let orchestrator = Arc::clone(self);
                let message = line.to_string();
                tokio::spawn(async move { orchestrator.spawn_llm_turn(message, tx).await });
                Ok(TurnOutcome::Streaming(rx))
            }
        }
    }

    /// Runs one LLM Engine turn to completion, appending the resulting
    /// chat messages and, if the response carried an operations block,
    /// applying and broadcasting it. Invoked on a detached task by
    /// [`Self::handle_line`] so the caller can drain `tx`'s receiver as
    /// chunks arrive instead of waiting for the whole turn.
    async fn spawn_llm_turn(&self, message: String, tx: mpsc::Sender<Chunk>) {
        let user_message = ChatMessage::new(self.chat_id.clone(), MessageRole::User, message.clone(), None);
        self.chat_log.lock().await.append(user_message);

        let chat_history = self.chat_log.lock().await.last_n(&self.chat_id, 20).into_iter().map(|m| context::ChatMessage {
            role: format!("{:?}", m.role).to_lowercase(),
            content: m.content.clone(),
        }).collect();

        let (engine_tx, mut engine_rx) = mpsc::channel(64);
        let request = EngineRequest { message: message.clone(), chat_history: Some(chat_history), phase_hint: None };
        let engine_result = self.engine.process_request_stream(request, engine_tx).await;

        let mut final_response = None;
        while let Some(chunk) = engine_rx.recv().await {
            if let Chunk::Complete { response } = &chunk {
                final_response = Some(response.clone());
            }
            if tx.send(chunk).await.is_err() {
                return;
            }
        }

        if let Err(e) = engine_result {
            tracing::warn!(error = %e, "llm engine turn failed");
            return;
        }

        let Some(response) = final_response else { return };
        let assistant_message = ChatMessage::new(
            self.chat_id.clone(),
            MessageRole::Assistant,
            response.text_response.clone(),
            response.operations.clone(),
        );
        self.chat_log.lock().await.append(assistant_message);

        if let Some(operations) = response.operations {
            if let Err(e) = self.apply_operations(&operations, UpdateOrigin::LlmOperation).await {
                tracing::warn!(error = %e, "llm-proposed operations block rejected");
            }
        }
    }

    /// Validate-then-apply one Format E operations block. On success,
    /// marks dirty (already done by the
    /// store's own write path), records an episode, broadcasts, and
    /// appends an audit-log entry. Never partially commits.
    pub async fn apply_operations(&self, diff: &str, origin: UpdateOrigin) -> Result<()> {
        self.data.apply_diff_text(diff)?;

        self.data.store_episode(
            "session-orchestrator",
            diff.to_string(),
            true,
            serde_json::json!({ "diff": diff }),
            "operations block applied",
        );

        let envelope = Envelope::GraphUpdate {
            diff: diff.to_string(),
            source: UpdateSource { user_id: self.user_id.clone(), session_id: self.session_id.clone(), origin },
            timestamp: chrono::Utc::now(),
        };
        self.broadcast.broadcast_update(&self.config.workspace_id, &self.config.system_id, envelope, &self.session_id);

        let entry = AuditLogEntry::new(
            self.config.workspace_id.clone(),
            self.config.system_id.clone(),
            Some(self.chat_id.clone()),
            Some(self.user_id.clone()),
            AuditAction::ApplyDiff,
            diff,
        );
        self.backend.create_audit_log(entry).await.map_err(|e| SessionError::Store(e.to_string()))?;

        Ok(())
    }

    /// Writes every dirty node/edge and the full message log, then clears
    /// dirty tracking. Occurs only here and in [`Self::shutdown`] — never
    /// on a timer.
    pub async fn persist(&self) -> Result<usize> {
        let store = self.data.store();
        let (nodes, edges) = store.dirty_snapshot();
        let dirty_count = nodes.len() + edges.len();

        self.backend
            .save_nodes(&self.config.workspace_id, &self.config.system_id, &nodes)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;
        self.backend
            .save_edges(&self.config.workspace_id, &self.config.system_id, &edges)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;

        let messages = self.chat_log.lock().await.all().to_vec();
        if !messages.is_empty() {
            self.backend
                .save_messages(&self.config.workspace_id, &self.config.system_id, &messages)
                .await
                .map_err(|e| SessionError::Store(e.to_string()))?;
        }

        let version = store.get_version();
        store.mark_persisted(version);

        let entry = AuditLogEntry::new(
            self.config.workspace_id.clone(),
            self.config.system_id.clone(),
            None,
            Some(self.user_id.clone()),
            AuditAction::Persist,
            String::new(),
        );
        self.backend.create_audit_log(entry).await.map_err(|e| SessionError::Store(e.to_string()))?;

        Ok(dirty_count)
    }

    /// Flushes pending persistence, tells the broadcast bus to drain and
    /// disconnect every client, and closes the long-term store connection.
    pub async fn shutdown(&self) -> Result<()> {
        self.persist().await?;
        self.broadcast.shutdown().await;
        self.backend.close().await.map_err(|e| SessionError::Store(e.to_string()))?;
        data_service::clear_registry();
        Ok(())
    }

    /// Re-render the canvas in its current view without mutating state.
    pub async fn render(&self) -> RenderData {
        self.canvas.lock().await.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBackend;
    use async_trait::async_trait;
    use llm::{CompletionRequest, LlmError, LlmProvider, ProviderEvent, StopReason, TokenUsage};
    use tools::ToolRegistry;

    struct ScriptedProvider;

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "test-model"
        }

        async fn stream_completion(&self, _request: CompletionRequest, tx: mpsc::Sender<ProviderEvent>) -> llm::Result<()> {
            tx.send(ProviderEvent::TextDelta("Adding a node.\n".into())).await.ok();
            tx.send(ProviderEvent::TextDelta("<operations>\n+ A.FUNC.001|payment step\n</operations>\n".into()))
                .await
                .ok();
            tx.send(ProviderEvent::MessageDone {
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage { input_tokens: 5, output_tokens: 5, ..Default::default() },
            })
            .await
            .ok();
            Ok(())
        }
    }

    async fn test_orchestrator(workspace: &str) -> Arc<SessionOrchestrator> {
        let config = SessionConfig { workspace_id: workspace.to_string(), system_id: "sys".to_string(), ..Default::default() };
        let backend: Arc<dyn GraphStoreBackend> = Arc::new(InMemoryBackend::new());
        let broadcast = BroadcastServer::new();
        let data = data_service::unified_data_service(&config.workspace_id, &config.system_id);
        let engine = Engine::new(
            data,
            Arc::new(ScriptedProvider),
            context::PromptAssembler::new("decompose top-down"),
            Arc::new(ToolRegistry::new()),
        );
        Arc::new(SessionOrchestrator::start(config, backend, broadcast, engine, "tester").await.unwrap())
    }

    #[tokio::test]
    async fn help_and_stats_resolve_without_touching_the_llm() {
        let orchestrator = test_orchestrator("ws-help").await;
        match orchestrator.handle_line("/help").await.unwrap() {
            TurnOutcome::Command(text) => assert!(text.contains("/save")),
            TurnOutcome::Streaming(_) => panic!("expected a command outcome"),
        }
        match orchestrator.handle_line("/stats").await.unwrap() {
            TurnOutcome::Command(text) => assert!(text.contains("nodes=0")),
            TurnOutcome::Streaming(_) => panic!("expected a command outcome"),
        }
    }

    #[tokio::test]
    async fn a_user_message_streams_chunks_and_applies_the_resulting_diff() {
        let orchestrator = test_orchestrator("ws-turn").await;
        let rx = match orchestrator.handle_line("add a payment step").await.unwrap() {
            TurnOutcome::Streaming(rx) => rx,
            TurnOutcome::Command(_) => panic!("expected a streaming outcome"),
        };
        let mut rx = rx;
        let mut saw_complete = false;
        while let Some(chunk) = rx.recv().await {
            if matches!(chunk, Chunk::Complete { .. }) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);

        // spawn_llm_turn only drops its sender after applying the diff, so
        // the channel closing here means the store is already updated.
        let stats = orchestrator.stats();
        assert_eq!(stats.node_count, 1);
        assert!(stats.dirty_count > 0, "the applied diff should leave a dirty node pending persistence");
    }

    #[tokio::test]
    async fn save_clears_the_dirty_set_and_persists_to_the_backend() {
        let orchestrator = test_orchestrator("ws-save").await;
        orchestrator.apply_operations("<operations>\n+ A.FUNC.001|x\n</operations>", UpdateOrigin::UserEdit).await.unwrap();
        assert!(orchestrator.stats().dirty_count > 0);

        match orchestrator.handle_line("/save").await.unwrap() {
            TurnOutcome::Command(text) => assert!(text.contains("persisted")),
            TurnOutcome::Streaming(_) => panic!("expected a command outcome"),
        }
        assert_eq!(orchestrator.stats().dirty_count, 0);
    }

    #[tokio::test]
    async fn shutdown_flushes_persistence_and_shuts_down_broadcast() {
        let orchestrator = test_orchestrator("ws-shutdown").await;
        orchestrator.apply_operations("<operations>\n+ A.FUNC.001|x\n</operations>", UpdateOrigin::UserEdit).await.unwrap();
        orchestrator.shutdown().await.unwrap();
        assert_eq!(orchestrator.stats().dirty_count, 0);
    }
}
