//! The abstract streaming contract a provider transport implements:
//! open a completion with cacheable system sections, a
//! message list (user/assistant/tool turns), and tool definitions; receive
//! a sequence of content-block events plus a final stop reason and token
//! usage. Two concrete transports exist: [`crate::remote::claude`]
//! (Anthropic Messages API) and [`crate::remote::openai`] (OpenAI
//! chat-completions API).

use crate::error::Result;
use async_trait::async_trait;
use context::{Cacheability, PromptSection};
use serde_json::Value;
use tokio::sync::mpsc;
use tools::ToolDefinition;

/// One turn in the message list sent to the provider. Tool-use and
/// tool-result blocks live on assistant/user turns respectively.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text(String),
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
}

impl ProviderMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: ProviderRole::User, blocks: vec![ContentBlock::Text(text.into())] }
    }
}

/// One request to open (or reopen, after a tool-use round) a streaming
/// completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub max_output_tokens: u32,
    pub system_sections: Vec<PromptSection>,
    pub messages: Vec<ProviderMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Whether a `PromptSection` should be marked for prefix-caching on a
/// transport that supports it. Transports without a caching primitive
/// ignore this and just concatenate.
pub fn is_cacheable(section: &PromptSection) -> bool {
    matches!(section.cacheability, Cacheability::Ephemeral)
}

/// A single event out of the provider's content-block stream:
/// `content_block_start`, `content_block_delta`, `content_block_stop`,
/// plus a final message.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    TextDelta(String),
    ToolUseStart { id: String, name: String },
    ToolInputDelta { id: String, partial_json: String },
    ToolUseStop { id: String },
    /// Terminal event for one streamed turn.
    MessageDone { stop_reason: StopReason, usage: TokenUsage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ToolUse,
    EndTurn,
    MaxTokens,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: Option<u64>,
    pub cache_write_tokens: Option<u64>,
}

/// A provider transport. `stream_completion` sends every content-block
/// event on `tx` as it arrives and returns once the turn's terminal event
/// has been sent (or the stream fails).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn stream_completion(&self, request: CompletionRequest, tx: mpsc::Sender<ProviderEvent>) -> Result<()>;
}
