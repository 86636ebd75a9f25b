//! OpenAI-compatible chat-completions transport. Covers
//! OpenAI itself and any provider that mirrors its `chat/completions`
//! streaming wire format; unlike the Anthropic transport this one has no
//! prompt-caching primitive, so `cache_control` hints are dropped.

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::provider::{
    CompletionRequest, ContentBlock as EngineBlock, LlmProvider, ProviderEvent, ProviderRole, StopReason, TokenUsage,
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tools::ToolDefinition;

pub struct OpenAiProvider {
    http_client: reqwest::Client,
    config: RemoteLlmConfig,
}

impl OpenAiProvider {
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http_client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunctionDef,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
}

fn convert_messages(request: &CompletionRequest) -> Vec<WireMessage> {
    let mut out = Vec::new();

    let system_text = request.system_sections.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join("\n\n");
    if !system_text.is_empty() {
        out.push(WireMessage { role: "system", content: Some(system_text), tool_calls: None, tool_call_id: None });
    }

    for message in &request.messages {
        match message.role {
            ProviderRole::User => {
                for block in &message.blocks {
                    match block {
                        EngineBlock::Text(text) => out.push(WireMessage {
                            role: "user",
                            content: Some(text.clone()),
                            tool_calls: None,
                            tool_call_id: None,
                        }),
                        EngineBlock::ToolResult { tool_use_id, content, .. } => out.push(WireMessage {
                            role: "tool",
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        }),
                        EngineBlock::ToolUse { .. } => {}
                    }
                }
            }
            ProviderRole::Assistant => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();
                for block in &message.blocks {
                    match block {
                        EngineBlock::Text(text) => text_parts.push(text.clone()),
                        EngineBlock::ToolUse { id, name, input } => tool_calls.push(WireToolCall {
                            id: id.clone(),
                            call_type: "function",
                            function: WireFunctionCall { name: name.clone(), arguments: input.to_string() },
                        }),
                        EngineBlock::ToolResult { .. } => {}
                    }
                }
                out.push(WireMessage {
                    role: "assistant",
                    content: if text_parts.is_empty() { None } else { Some(text_parts.join("")) },
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                });
            }
        }
    }

    out
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            tool_type: "function",
            function: WireFunctionDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters_schema.clone(),
            },
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunctionCall>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkFunctionCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn convert_finish_reason(raw: Option<&str>) -> StopReason {
    match raw {
        Some("tool_calls") => StopReason::ToolUse,
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::Other,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream_completion(&self, request: CompletionRequest, tx: mpsc::Sender<ProviderEvent>) -> Result<()> {
        let wire_request = ChatCompletionRequest {
            model: request.model.clone(),
            max_tokens: request.max_output_tokens,
            messages: convert_messages(&request),
            tools: convert_tools(&request.tools),
            stream: true,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .header("content-type", "application/json")
            .json(&wire_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!("openai-compatible endpoint responded {status}: {body}")));
        }

        let mut event_stream = response.bytes_stream().eventsource();
        // OpenAI-compatible deltas carry a tool-call `index` per streamed
        // fragment rather than a distinct block id; we mint the id on first
        // sight of each index and remember it so start/stop events line up.
        let mut ids_by_index: HashMap<usize, String> = HashMap::new();
        let mut usage = TokenUsage::default();

        while let Some(frame) = event_stream.next().await {
            let frame = frame.map_err(|e| LlmError::MalformedEvent(e.to_string()))?;
            if frame.data == "[DONE]" {
                break;
            }

            let chunk: ChatCompletionChunk = match serde_json::from_str(&frame.data) {
                Ok(chunk) => chunk,
                Err(e) => return Err(LlmError::MalformedEvent(format!("{e}: {}", frame.data))),
            };

            if let Some(chunk_usage) = chunk.usage {
                usage.input_tokens = chunk_usage.prompt_tokens;
                usage.output_tokens = chunk_usage.completion_tokens;
            }

            let Some(choice) = chunk.choices.into_iter().next() else { continue };

            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    let _ = tx.send(ProviderEvent::TextDelta(text)).await;
                }
            }

            for call in choice.delta.tool_calls.into_iter().flatten() {
                let id = if let Some(id) = call.id.clone() {
                    ids_by_index.entry(call.index).or_insert_with(|| id.clone());
                    id
                } else {
                    ids_by_index.entry(call.index).or_insert_with(|| format!("call_{}", call.index)).clone()
                };

                if let Some(name) = call.function.as_ref().and_then(|f| f.name.clone()) {
                    let _ = tx.send(ProviderEvent::ToolUseStart { id: id.clone(), name }).await;
                }
                if let Some(partial_json) = call.function.and_then(|f| f.arguments) {
                    if !partial_json.is_empty() {
                        let _ = tx.send(ProviderEvent::ToolInputDelta { id: id.clone(), partial_json }).await;
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                for id in ids_by_index.values() {
                    let _ = tx.send(ProviderEvent::ToolUseStop { id: id.clone() }).await;
                }
                let _ =
                    tx.send(ProviderEvent::MessageDone { stop_reason: convert_finish_reason(Some(&reason)), usage })
                        .await;
            }
        }

        Ok(())
    }
}
