//! Error types for the LLM Engine and its provider transports.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors raised by a provider transport or the engine's tool-use loop.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport-level failure: connection refused, DNS failure, TLS error.
    /// Distinct from a mid-stream failure, which aborts the turn outright
    /// rather than being wrapped in this variant.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// The stream ended, or a frame failed to parse, before a terminal
    /// `message_stop`/`[DONE]` event arrived.
    #[error("provider stream ended unexpectedly: {0}")]
    StreamEnded(String),

    #[error("malformed server-sent event: {0}")]
    MalformedEvent(String),

    #[error("provider returned an error: {0}")]
    Provider(String),

    #[error("tool execution failed: {0}")]
    Tool(#[from] tools::ToolError),

    #[error("tool call carried invalid JSON input: {0}")]
    InvalidToolInput(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether a fresh attempt at opening the stream is worth retrying.
    /// Mid-stream failures are never retried; this only governs the
    /// initial connect.
    pub fn is_retryable_connect_error(&self) -> bool {
        matches!(self, LlmError::Http(e) if e.is_connect() || e.is_timeout())
    }
}
