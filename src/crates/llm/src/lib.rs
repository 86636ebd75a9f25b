//! LLM Engine: the streaming request pipeline, plus the two provider
//! transports it opens completions against.
//!
//! ```rust,ignore
//! use llm::{ClaudeProvider, Engine, EngineRequest, RemoteLlmConfig};
//! use context::PromptAssembler;
//! use std::sync::Arc;
//! use tools::ToolRegistry;
//!
//! let data = data_service::unified_data_service("acme", "checkout");
//! let provider = Arc::new(ClaudeProvider::new(RemoteLlmConfig::from_env(
//!     "ANTHROPIC_API_KEY", "https://api.anthropic.com", "claude-3-5-sonnet-20241022",
//! )?)?);
//! let engine = Engine::new(data, provider, PromptAssembler::new("decompose top-down"), Arc::new(ToolRegistry::new()));
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(32);
//! engine.process_request_stream(
//!     EngineRequest { message: "add a checkout flow".into(), chat_history: None, phase_hint: None },
//!     tx,
//! ).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod remote;

pub use config::{EngineConfig, RemoteLlmConfig};
pub use engine::{Chunk, Engine, EngineRequest, LlmResponse};
pub use error::{LlmError, Result};
pub use provider::{
    is_cacheable, CompletionRequest, ContentBlock, LlmProvider, ProviderEvent, ProviderMessage, ProviderRole,
    StopReason, TokenUsage,
};
pub use remote::{ClaudeProvider, OpenAiProvider};
