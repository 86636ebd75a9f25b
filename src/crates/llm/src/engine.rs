//! The LLM Engine: the streaming request pipeline that ties the Unified
//! Data Service, Context Slicer, Prompt Assembler, a provider transport,
//! and the Tool Registry into one turn.

use crate::config::EngineConfig;
use crate::error::{LlmError, Result};
use crate::provider::{
    CompletionRequest, ContentBlock, LlmProvider, ProviderEvent, ProviderMessage, ProviderRole, StopReason,
    TokenUsage,
};
use context::{
    extract_all_complete_block_spans, is_inside_operations_block, parse_response, ChatMessage, ContextSlicer,
    PromptAssembler,
};
use data_service::UnifiedDataService;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tools::ToolRegistry;

/// A chunk emitted to the caller of [`Engine::process_request_stream`]
/// over its channel. Mirrors a plain `onChunk` callback contract.
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Plain prose, incremental.
    Text { text: String },
    /// A complete `<operations>` block, tags included.
    Content { text: String },
    Complete { response: LlmResponse },
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text_response: String,
    pub operations: Option<String>,
    pub usage: TokenUsage,
    pub cache_hit: bool,
    pub model: String,
    pub response_id: String,
}

#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub message: String,
    pub chat_history: Option<Vec<ChatMessage>>,
    /// Passed through to the Context Slicer's `validate-phase` strategy.
    pub phase_hint: Option<i64>,
}

/// Owns everything one streamed turn needs except the caller's channel.
pub struct Engine {
    data: Arc<UnifiedDataService>,
    provider: Arc<dyn LlmProvider>,
    assembler: PromptAssembler,
    tools: Arc<ToolRegistry>,
    slicer: ContextSlicer,
    config: EngineConfig,
    max_output_tokens: u32,
}

impl Engine {
    pub fn new(
        data: Arc<UnifiedDataService>,
        provider: Arc<dyn LlmProvider>,
        assembler: PromptAssembler,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            data,
            provider,
            assembler,
            tools,
            slicer: ContextSlicer::default(),
            config: EngineConfig::default(),
            max_output_tokens: 4096,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_slicer(mut self, slicer: ContextSlicer) -> Self {
        self.slicer = slicer;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Run one turn, emitting every chunk on `tx` as it becomes available:
    /// cache probe, prompt build, tool-use loop, parse, cache write, final chunk.
    pub async fn process_request_stream(&self, request: EngineRequest, tx: mpsc::Sender<Chunk>) -> Result<()> {
        let graph_version = self.data.get_version();

        // Step 1: cache probe.
        if let Some(hit) = self.data.check_cache(&request.message, graph_version) {
            let _ = tx.send(Chunk::Text { text: hit.response.clone() }).await;
            let _ = tx
                .send(Chunk::Complete {
                    response: LlmResponse {
                        text_response: hit.response,
                        operations: hit.operations,
                        usage: TokenUsage::default(),
                        cache_hit: true,
                        model: self.provider.model().to_string(),
                        response_id: uuid::Uuid::new_v4().to_string(),
                    },
                })
                .await;
            return Ok(());
        }

        // Step 2: build prompt.
        let slice = self.slicer.slice(self.data.store(), &request.message, request.phase_hint);
        let graph_text = self.slicer.serialize(&slice);
        let sections = self.assembler.assemble(&graph_text, request.chat_history.as_deref());
        let tool_defs = self.tools.definitions();

        // Step 3: tool-use loop.
        let mut messages = vec![ProviderMessage::user_text(&request.message)];
        let mut response_buffer = String::new();
        let mut emitted_blocks = 0usize;
        let mut emitted_up_to = 0usize;
        let mut total_usage = TokenUsage::default();
        let mut final_stop_reason = StopReason::Other;

        for iteration in 0..=self.config.max_tool_iterations {
            let completion_request = CompletionRequest {
                model: self.provider.model().to_string(),
                max_output_tokens: self.max_output_tokens,
                system_sections: sections.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
            };

            let (provider_tx, mut provider_rx) = mpsc::channel(128);
            let provider = self.provider.clone();
            let handle = tokio::spawn(async move { provider.stream_completion(completion_request, provider_tx).await });

            let mut turn_text = String::new();
            let mut pending_tools: HashMap<String, PendingToolCall> = HashMap::new();
            let mut tool_order: Vec<String> = Vec::new();
            let mut turn_done: Option<(StopReason, TokenUsage)> = None;

            while let Some(event) = provider_rx.recv().await {
                match event {
                    ProviderEvent::TextDelta(text) => {
                        turn_text.push_str(&text);
                        response_buffer.push_str(&text);

                        let spans = extract_all_complete_block_spans(&response_buffer);
                        if spans.len() > emitted_blocks {
                            for span in &spans[emitted_blocks..] {
                                let _ = tx.send(Chunk::Content { text: span.full.clone() }).await;
                            }
                            emitted_blocks = spans.len();
                            emitted_up_to = spans.last().map(|s| s.end).unwrap_or(emitted_up_to);
                        }
                        // A delta can carry prose on both sides of a tag boundary
                        // (e.g. "...</operations>\nDone."): a block closing or
                        // opening within this delta must not swallow whatever
                        // text sits after the last emitted block. Emit
                        // everything not yet delivered and outside any
                        // currently-open block, tracked by `emitted_up_to`
                        // rather than by the raw delta text.
                        if !is_inside_operations_block(&response_buffer) && emitted_up_to < response_buffer.len() {
                            let remainder = response_buffer[emitted_up_to..].to_string();
                            emitted_up_to = response_buffer.len();
                            let _ = tx.send(Chunk::Text { text: remainder }).await;
                        }
                    }
                    ProviderEvent::ToolUseStart { id, name } => {
                        tool_order.push(id.clone());
                        pending_tools.insert(id, PendingToolCall { name, partial_json: String::new() });
                    }
                    ProviderEvent::ToolInputDelta { id, partial_json } => {
                        if let Some(call) = pending_tools.get_mut(&id) {
                            call.partial_json.push_str(&partial_json);
                        }
                    }
                    ProviderEvent::ToolUseStop { .. } => {}
                    ProviderEvent::MessageDone { stop_reason, usage } => {
                        turn_done = Some((stop_reason, usage));
                    }
                }
            }

            handle.await.map_err(|e| LlmError::StreamEnded(e.to_string()))??;
            let (stop_reason, turn_usage) = turn_done
                .ok_or_else(|| LlmError::StreamEnded("provider closed the stream without a terminal event".into()))?;

            total_usage.input_tokens += turn_usage.input_tokens;
            total_usage.output_tokens += turn_usage.output_tokens;
            total_usage.cache_read_tokens = turn_usage.cache_read_tokens.or(total_usage.cache_read_tokens);
            total_usage.cache_write_tokens = turn_usage.cache_write_tokens.or(total_usage.cache_write_tokens);
            final_stop_reason = stop_reason;

            let is_last_allowed_iteration = iteration == self.config.max_tool_iterations;
            if stop_reason != StopReason::ToolUse || is_last_allowed_iteration {
                break;
            }

            let mut assistant_blocks = Vec::new();
            if !turn_text.is_empty() {
                assistant_blocks.push(ContentBlock::Text(turn_text.clone()));
            }
            let mut tool_results = Vec::new();
            for id in &tool_order {
                let Some(call) = pending_tools.remove(id) else { continue };
                let input = if call.partial_json.is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&call.partial_json)
                        .unwrap_or_else(|e| json!({"error": format!("malformed tool input: {e}")}))
                };
                assistant_blocks.push(ContentBlock::ToolUse { id: id.clone(), name: call.name.clone(), input: input.clone() });

                match self.tools.execute(&call.name, self.data.store(), input).await {
                    Ok(result) => tool_results.push(ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content: result.to_string(),
                        is_error: false,
                    }),
                    Err(e) => tool_results.push(ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content: e.to_string(),
                        is_error: true,
                    }),
                }
            }

            messages.push(ProviderMessage { role: ProviderRole::Assistant, blocks: assistant_blocks });
            messages.push(ProviderMessage { role: ProviderRole::User, blocks: tool_results });
        }

        let _ = final_stop_reason;

        // Step 4: parse complete response.
        let parsed = parse_response(&response_buffer);

        // Step 6: write side effects.
        self.data.cache_response(&request.message, graph_version, parsed.text_response.clone(), parsed.operations.clone());
        self.data.store_episode(
            "llm-engine",
            request.message.clone(),
            parsed.operations.is_some(),
            json!({ "operations": parsed.operations, "model": self.provider.model() }),
            if parsed.operations.is_some() { "produced a diff" } else { "text-only turn" },
        );

        // Step 7: final chunk.
        let response = LlmResponse {
            text_response: parsed.text_response,
            operations: parsed.operations,
            usage: total_usage,
            cache_hit: false,
            model: self.provider.model().to_string(),
            response_id: uuid::Uuid::new_v4().to_string(),
        };
        let _ = tx.send(Chunk::Complete { response }).await;

        Ok(())
    }
}

struct PendingToolCall {
    name: String,
    partial_json: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderEvent;
    use async_trait::async_trait;
    use context::PromptAssembler;
    use parking_lot::Mutex;
    use tools::ToolRegistry;

    struct ScriptedProvider {
        model: String,
        turns: Mutex<Vec<Vec<ProviderEvent>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn model(&self) -> &str {
            &self.model
        }

        async fn stream_completion(&self, _request: CompletionRequest, tx: mpsc::Sender<ProviderEvent>) -> Result<()> {
            let turn = self.turns.lock().remove(0);
            for event in turn {
                tx.send(event).await.ok();
            }
            Ok(())
        }
    }

    fn engine_with(provider: ScriptedProvider) -> (Engine, Arc<UnifiedDataService>) {
        let data = data_service::unified_data_service(&format!("ws-{}", uuid::Uuid::new_v4()), "sys-1");
        let engine = Engine::new(
            data.clone(),
            Arc::new(provider),
            PromptAssembler::new("decompose top-down"),
            Arc::new(ToolRegistry::new()),
        );
        (engine, data)
    }

    #[tokio::test]
    async fn single_turn_emits_text_then_complete() {
        let provider = ScriptedProvider {
            model: "claude-3-5-sonnet".into(),
            turns: Mutex::new(vec![vec![
                ProviderEvent::TextDelta("Adding a node.\n".into()),
                ProviderEvent::TextDelta("<operations>\n+ A.FUNC.001|x\n</operations>\n".into()),
                ProviderEvent::TextDelta("Done.".into()),
                ProviderEvent::MessageDone { stop_reason: StopReason::EndTurn, usage: TokenUsage { input_tokens: 10, output_tokens: 5, ..Default::default() } },
            ]]),
        };
        let (engine, _data) = engine_with(provider);
        let (tx, mut rx) = mpsc::channel(32);
        engine
            .process_request_stream(
                EngineRequest { message: "add a node".into(), chat_history: None, phase_hint: None },
                tx,
            )
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }

        let has_content = chunks.iter().any(|c| matches!(c, Chunk::Content { text } if text.contains("A.FUNC.001")));
        assert!(has_content, "expected one content chunk carrying the operations block");

        let complete = chunks.iter().find_map(|c| match c {
            Chunk::Complete { response } => Some(response),
            _ => None,
        });
        let response = complete.expect("expected a complete chunk");
        assert!(response.operations.as_deref().unwrap().contains("A.FUNC.001"));
        assert!(!response.cache_hit);
        assert_eq!(response.usage.input_tokens, 10);
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_tool_loop() {
        let provider = ScriptedProvider { model: "claude-3-5-sonnet".into(), turns: Mutex::new(vec![]) };
        let (engine, data) = engine_with(provider);
        data.cache_response("add a node", data.get_version(), "cached answer".into(), None);

        let (tx, mut rx) = mpsc::channel(32);
        engine
            .process_request_stream(
                EngineRequest { message: "add a node".into(), chat_history: None, phase_hint: None },
                tx,
            )
            .await
            .unwrap();

        let mut saw_cache_hit = false;
        while let Some(chunk) = rx.recv().await {
            if let Chunk::Complete { response } = chunk {
                assert!(response.cache_hit);
                assert_eq!(response.usage, TokenUsage::default());
                saw_cache_hit = true;
            }
        }
        assert!(saw_cache_hit);
    }

    #[tokio::test]
    async fn provider_error_aborts_without_a_complete_chunk() {
        struct FailingProvider;

        #[async_trait]
        impl LlmProvider for FailingProvider {
            fn model(&self) -> &str {
                "failing"
            }

            async fn stream_completion(&self, _request: CompletionRequest, _tx: mpsc::Sender<ProviderEvent>) -> Result<()> {
                Err(LlmError::Provider("boom".into()))
            }
        }

        let data = data_service::unified_data_service(&format!("ws-{}", uuid::Uuid::new_v4()), "sys-err");
        let engine = Engine::new(data, Arc::new(FailingProvider), PromptAssembler::new("guide"), Arc::new(ToolRegistry::new()));
        let (tx, mut rx) = mpsc::channel(32);
        let result = engine
            .process_request_stream(EngineRequest { message: "hi".into(), chat_history: None, phase_hint: None }, tx)
            .await;
        assert!(result.is_err());
        assert!(rx.recv().await.is_none(), "no chunk should be emitted on a provider error");
    }
}
