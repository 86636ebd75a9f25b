//! Configuration for a remote LLM provider transport and the engine's
//! tool-use loop.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a remote LLM provider (Anthropic Messages API or an
/// OpenAI-compatible chat-completions API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_key: String,

    /// Examples: Anthropic `https://api.anthropic.com`, OpenAI
    /// `https://api.openai.com/v1`, or any OpenAI-compatible base URL.
    pub base_url: String,

    pub model: String,

    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl RemoteLlmConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: default_timeout(),
            max_output_tokens: default_max_output_tokens(),
        }
    }

    pub fn from_env(env_var: &str, base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key =
            std::env::var(env_var).map_err(|_| LlmError::ApiKeyNotFound(format!("environment variable {env_var}")))?;
        Ok(Self::new(api_key, base_url, model))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_output_tokens() -> u32 {
    4096
}

/// Bounds on the engine's tool-use loop: terminate in <= 5 tool-use
/// iterations plus one final turn.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub max_tool_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_tool_iterations: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = RemoteLlmConfig::new("key", "https://api.anthropic.com", "claude-3-5-sonnet-20241022")
            .with_timeout(Duration::from_secs(30))
            .with_max_output_tokens(1024);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_output_tokens, 1024);
    }

    #[test]
    fn from_env_reports_missing_key() {
        std::env::remove_var("LLM_TEST_NONEXISTENT_KEY");
        let err = RemoteLlmConfig::from_env("LLM_TEST_NONEXISTENT_KEY", "https://x", "model").unwrap_err();
        assert!(matches!(err, LlmError::ApiKeyNotFound(_)));
    }
}
