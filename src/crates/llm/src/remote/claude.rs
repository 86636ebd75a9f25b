//! Anthropic Messages API transport: SSE streaming with
//! prompt-prefix caching via `cache_control` on system blocks.

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::provider::{
    is_cacheable, CompletionRequest, ContentBlock as EngineBlock, LlmProvider, ProviderEvent, ProviderRole,
    StopReason, TokenUsage,
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tools::ToolDefinition;

const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeProvider {
    http_client: reqwest::Client,
    config: RemoteLlmConfig,
}

impl ClaudeProvider {
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http_client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    cache_type: &'static str,
}

impl CacheControl {
    fn ephemeral() -> Self {
        Self { cache_type: "ephemeral" }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<SystemBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        #[allow(dead_code)]
        message: MessageStartData,
    },
    ContentBlockStart {
        index: u32,
        content_block: StreamContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaData,
        usage: Usage,
    },
    MessageStop,
    Ping,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStartData {
    #[serde(default)]
    #[allow(dead_code)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamContentBlock {
    Text {
        #[allow(dead_code)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaData {
    #[serde(default)]
    stop_reason: Option<String>,
}

fn convert_stop_reason(raw: Option<&str>) -> StopReason {
    match raw {
        Some("tool_use") => StopReason::ToolUse,
        Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::Other,
    }
}

fn convert_system(sections: &[context::PromptSection]) -> Vec<SystemBlock> {
    sections
        .iter()
        .map(|section| SystemBlock {
            block_type: "text",
            text: section.text.clone(),
            cache_control: if is_cacheable(section) { Some(CacheControl::ephemeral()) } else { None },
        })
        .collect()
}

fn convert_messages(messages: &[crate::provider::ProviderMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: match m.role {
                ProviderRole::User => "user",
                ProviderRole::Assistant => "assistant",
            },
            content: m
                .blocks
                .iter()
                .map(|b| match b {
                    EngineBlock::Text(text) => WireContentBlock::Text { text: text.clone(), cache_control: None },
                    EngineBlock::ToolUse { id, name, input } => {
                        WireContentBlock::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() }
                    }
                    EngineBlock::ToolResult { tool_use_id, content, is_error } => WireContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: content.clone(),
                        is_error: *is_error,
                    },
                })
                .collect(),
        })
        .collect()
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters_schema.clone(),
        })
        .collect()
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream_completion(&self, request: CompletionRequest, tx: mpsc::Sender<ProviderEvent>) -> Result<()> {
        let wire_request = AnthropicRequest {
            model: request.model,
            max_tokens: request.max_output_tokens,
            messages: convert_messages(&request.messages),
            system: convert_system(&request.system_sections),
            tools: convert_tools(&request.tools),
            stream: true,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", DEFAULT_ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&wire_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!("anthropic responded {status}: {body}")));
        }

        let mut event_stream = response.bytes_stream().eventsource();
        // Anthropic streams input_json_delta fragments per tool-use block;
        // the engine only needs them forwarded, so no accumulation here.
        // Deltas and the block-stop event carry only the block's `index`, not
        // its `id`, so we remember the id the block's `content_block_start`
        // announced and key every later event for that index on it.
        let mut ids_by_index: HashMap<u32, String> = HashMap::new();
        while let Some(frame) = event_stream.next().await {
            let frame = frame.map_err(|e| LlmError::MalformedEvent(e.to_string()))?;
            if frame.data == "[DONE]" {
                break;
            }
            let event: StreamEvent = match serde_json::from_str(&frame.data) {
                Ok(event) => event,
                Err(e) => return Err(LlmError::MalformedEvent(format!("{e}: {}", frame.data))),
            };

            match event {
                StreamEvent::ContentBlockStart {
                    index, content_block: StreamContentBlock::ToolUse { id, name },
                } => {
                    ids_by_index.insert(index, id.clone());
                    let _ = tx.send(ProviderEvent::ToolUseStart { id, name }).await;
                }
                StreamEvent::ContentBlockDelta { delta: ContentDelta::TextDelta { text }, .. } => {
                    let _ = tx.send(ProviderEvent::TextDelta(text)).await;
                }
                StreamEvent::ContentBlockDelta {
                    delta: ContentDelta::InputJsonDelta { partial_json }, index,
                } => {
                    if let Some(id) = ids_by_index.get(&index) {
                        let _ = tx.send(ProviderEvent::ToolInputDelta { id: id.clone(), partial_json }).await;
                    }
                }
                StreamEvent::ContentBlockStop { index } => {
                    if let Some(id) = ids_by_index.remove(&index) {
                        let _ = tx.send(ProviderEvent::ToolUseStop { id }).await;
                    }
                }
                StreamEvent::MessageDelta { delta, usage } => {
                    let _ = tx
                        .send(ProviderEvent::MessageDone {
                            stop_reason: convert_stop_reason(delta.stop_reason.as_deref()),
                            usage: TokenUsage {
                                input_tokens: usage.input_tokens,
                                output_tokens: usage.output_tokens,
                                cache_read_tokens: usage.cache_read_input_tokens,
                                cache_write_tokens: usage.cache_creation_input_tokens,
                            },
                        })
                        .await;
                }
                StreamEvent::MessageStart { .. }
                | StreamEvent::ContentBlockStart { .. }
                | StreamEvent::MessageStop
                | StreamEvent::Ping
                | StreamEvent::Unknown => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderMessage;

    #[test]
    fn convert_messages_preserves_role_and_tool_blocks() {
        let messages = vec![
            ProviderMessage::user_text("hello"),
            crate::provider::ProviderMessage {
                role: ProviderRole::Assistant,
                blocks: vec![EngineBlock::ToolUse {
                    id: "t1".into(),
                    name: "graph_query".into(),
                    input: serde_json::json!({"query_type": "nodes"}),
                }],
            },
        ];
        let wire = convert_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[1].role, "assistant");
    }

    #[test]
    fn stop_reason_maps_tool_use() {
        assert_eq!(convert_stop_reason(Some("tool_use")), StopReason::ToolUse);
        assert_eq!(convert_stop_reason(Some("end_turn")), StopReason::EndTurn);
        assert_eq!(convert_stop_reason(Some("max_tokens")), StopReason::MaxTokens);
        assert_eq!(convert_stop_reason(None), StopReason::Other);
    }

    #[test]
    fn cacheable_sections_get_ephemeral_cache_control() {
        let sections = vec![
            context::PromptSection {
                name: "ontology",
                text: "spec".into(),
                cacheability: context::Cacheability::Ephemeral,
            },
            context::PromptSection {
                name: "graph_state",
                text: "state".into(),
                cacheability: context::Cacheability::Volatile,
            },
        ];
        let blocks = convert_system(&sections);
        assert!(blocks[0].cache_control.is_some());
        assert!(blocks[1].cache_control.is_none());
    }
}
