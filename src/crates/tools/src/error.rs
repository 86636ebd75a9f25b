use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter {0}: {1}")]
    InvalidParameter(&'static str, String),
}

pub type Result<T> = std::result::Result<T, ToolError>;
