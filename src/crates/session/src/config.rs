//! `SessionConfig`: provider selection, API keys, the broadcast bind
//! address, the long-term store endpoint, cache TTL, and the prompt token
//! budget — layered defaults -> environment -> optional TOML file, built
//! on `tooling::config::ConfigBuilder`.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tooling::config::ConfigBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Claude,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub workspace_id: String,
    pub system_id: String,

    pub provider: ProviderKind,
    pub api_key_env: String,
    pub model: String,
    pub base_url: String,

    pub broadcast_bind: String,
    pub store_endpoint: String,

    pub cache_ttl_secs: u64,
    pub prompt_token_budget: usize,
    pub max_output_tokens: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_id: "default".to_string(),
            system_id: "default".to_string(),
            provider: ProviderKind::Claude,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            broadcast_bind: "127.0.0.1:8787".to_string(),
            store_endpoint: "memory://local".to_string(),
            cache_ttl_secs: data_service::DEFAULT_TTL_SECS,
            prompt_token_budget: 8_000,
            max_output_tokens: 4_096,
        }
    }
}

impl ConfigBuilder for SessionConfig {
    fn validate(&self) -> tooling::Result<()> {
        if self.workspace_id.is_empty() {
            return Err(tooling::ToolingError::General("workspace_id must not be empty".into()));
        }
        if self.system_id.is_empty() {
            return Err(tooling::ToolingError::General("system_id must not be empty".into()));
        }
        Ok(())
    }

    /// Reads `{PREFIX}WORKSPACE_ID`, `{PREFIX}SYSTEM_ID`, `{PREFIX}PROVIDER`,
    /// `{PREFIX}API_KEY_ENV`, `{PREFIX}MODEL`, `{PREFIX}BASE_URL`,
    /// `{PREFIX}BROADCAST_BIND`, `{PREFIX}STORE_ENDPOINT`,
    /// `{PREFIX}CACHE_TTL_SECS`, `{PREFIX}PROMPT_TOKEN_BUDGET`,
    /// `{PREFIX}MAX_OUTPUT_TOKENS`; any absent variable falls back to
    /// `SessionConfig::default()` below.
    fn from_env(prefix: &str) -> tooling::Result<Self> {
        use tooling::config::{get_env_or, get_env_parse_or};
        let defaults = Self::default();
        let provider = match get_env_or(&format!("{prefix}PROVIDER"), "claude")?.to_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            _ => ProviderKind::Claude,
        };
        Ok(Self {
            workspace_id: get_env_or(&format!("{prefix}WORKSPACE_ID"), defaults.workspace_id)?,
            system_id: get_env_or(&format!("{prefix}SYSTEM_ID"), defaults.system_id)?,
            provider,
            api_key_env: get_env_or(&format!("{prefix}API_KEY_ENV"), defaults.api_key_env)?,
            model: get_env_or(&format!("{prefix}MODEL"), defaults.model)?,
            base_url: get_env_or(&format!("{prefix}BASE_URL"), defaults.base_url)?,
            broadcast_bind: get_env_or(&format!("{prefix}BROADCAST_BIND"), defaults.broadcast_bind)?,
            store_endpoint: get_env_or(&format!("{prefix}STORE_ENDPOINT"), defaults.store_endpoint)?,
            cache_ttl_secs: get_env_parse_or(&format!("{prefix}CACHE_TTL_SECS"), defaults.cache_ttl_secs)?,
            prompt_token_budget: get_env_parse_or(&format!("{prefix}PROMPT_TOKEN_BUDGET"), defaults.prompt_token_budget)?,
            max_output_tokens: get_env_parse_or(&format!("{prefix}MAX_OUTPUT_TOKENS"), defaults.max_output_tokens)?,
        })
    }

    /// `other`'s non-default-looking fields win; used to layer a TOML file
    /// on top of environment-derived values.
    fn merge(&mut self, other: Self) -> &mut Self {
        let defaults = Self::default();
        if other.workspace_id != defaults.workspace_id {
            self.workspace_id = other.workspace_id;
        }
        if other.system_id != defaults.system_id {
            self.system_id = other.system_id;
        }
        self.provider = other.provider;
        if other.api_key_env != defaults.api_key_env {
            self.api_key_env = other.api_key_env;
        }
        if other.model != defaults.model {
            self.model = other.model;
        }
        if other.base_url != defaults.base_url {
            self.base_url = other.base_url;
        }
        if other.broadcast_bind != defaults.broadcast_bind {
            self.broadcast_bind = other.broadcast_bind;
        }
        if other.store_endpoint != defaults.store_endpoint {
            self.store_endpoint = other.store_endpoint;
        }
        self.cache_ttl_secs = other.cache_ttl_secs;
        self.prompt_token_budget = other.prompt_token_budget;
        self.max_output_tokens = other.max_output_tokens;
        self
    }
}

impl SessionConfig {
    /// Defaults, then environment (`GRAPHED_` prefix), then an optional
    /// TOML file on top, if one exists at `path`. A single caller-supplied
    /// path rather than a fixed user/project pair.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // `from_env` already falls back to `SessionConfig::default()` field by
        // field (via `get_env_or`/`get_env_parse_or`), so there is no
        // remaining gap for the trait's `from_env_with_defaults` to fill;
        // calling it here would run our asymmetric `merge` a second time
        // with `defaults` as `other` and clobber the four unconditionally-
        // overwritten fields (provider, cache_ttl_secs, prompt_token_budget,
        // max_output_tokens) even when the environment set them.
        let mut config = SessionConfig::from_env("GRAPHED_").map_err(|e| ConfigError::Missing(e.to_string()))?;
        config.validate().map_err(|e| ConfigError::Missing(e.to_string()))?;

        if let Some(path) = path {
            if path.exists() {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                let file_config: SessionConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
                config.merge(file_config);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn load_with_no_file_falls_back_to_env_and_defaults() {
        std::env::remove_var("GRAPHED_WORKSPACE_ID");
        let config = SessionConfig::load(None).unwrap();
        assert_eq!(config.workspace_id, "default");
        assert_eq!(config.cache_ttl_secs, data_service::DEFAULT_TTL_SECS);
    }

    #[test]
    fn load_preserves_an_env_supplied_cache_ttl() {
        std::env::set_var("GRAPHED_CACHE_TTL_SECS", "120");
        let config = SessionConfig::load(None).unwrap();
        std::env::remove_var("GRAPHED_CACHE_TTL_SECS");
        assert_eq!(config.cache_ttl_secs, 120);
    }

    #[test]
    fn load_merges_a_toml_file_over_defaults() {
        let dir = std::env::temp_dir().join(format!("session-config-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.toml");
        std::fs::write(&path, "workspace_id = \"acme\"\nsystem_id = \"checkout\"\nprovider = \"open_ai\"\napi_key_env = \"OPENAI_API_KEY\"\nmodel = \"gpt-4o\"\nbase_url = \"https://api.openai.com/v1\"\nbroadcast_bind = \"0.0.0.0:9000\"\nstore_endpoint = \"memory://local\"\ncache_ttl_secs = 60\nprompt_token_budget = 4000\nmax_output_tokens = 2048\n").unwrap();

        let config = SessionConfig::load(Some(&path)).unwrap();
        assert_eq!(config.workspace_id, "acme");
        assert_eq!(config.system_id, "checkout");
        assert_eq!(config.cache_ttl_secs, 60);

        std::fs::remove_dir_all(&dir).ok();
    }
}
