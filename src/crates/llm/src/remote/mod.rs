//! Remote LLM provider transports.
//!
//! - **Claude** - Anthropic Messages API, with prompt-prefix caching.
//! - **OpenAI** - any OpenAI-compatible chat-completions API.

pub mod claude;
pub mod openai;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;
