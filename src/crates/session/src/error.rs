//! Errors the Session Orchestrator surfaces to its caller. Every variant
//! names an error *kind*; nothing here wraps a partial
//! side effect — by the time a `SessionError` reaches the caller, the
//! store, dirty set, and broadcast bus are already back in a consistent
//! state.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Format E parse failure: the diff was never applied.
    #[error("malformed operations block: {0}")]
    MalformedDiff(#[from] format_e::FormatEError),

    /// Duplicate id / dangling edge reference: the diff was rejected
    /// atomically, nothing partial was committed.
    #[error("diff rejected: {0}")]
    IntegrityViolation(#[from] graph_core::GraphStoreError),

    #[error(transparent)]
    Canvas(#[from] canvas::CanvasError),

    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    #[error("long-term store error: {0}")]
    Store(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("missing required configuration value: {0}")]
    Missing(String),
}

impl From<graph_core::ApplyError> for SessionError {
    fn from(e: graph_core::ApplyError) -> Self {
        match e {
            graph_core::ApplyError::Parse(e) => SessionError::MalformedDiff(e),
            graph_core::ApplyError::Store(e) => SessionError::IntegrityViolation(e),
        }
    }
}
