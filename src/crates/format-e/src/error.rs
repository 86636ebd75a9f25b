use thiserror::Error;

/// Errors produced while parsing a Format E diff block. Every variant carries
/// the 1-indexed line number within the `<operations>` block so the session
/// binary can surface a precise diagnostic back to the caller.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FormatEError {
    #[error("line {line}: unterminated bracketed attribute list")]
    UnterminatedAttribute { line: usize },

    #[error("line {line}: unknown node type abbreviation {abbr:?}")]
    UnknownNodeType { line: usize, abbr: String },

    #[error("line {line}: unknown edge arrow {arrow:?}")]
    UnknownEdgeArrow { line: usize, arrow: String },

    #[error("line {line}: malformed line: {text:?}")]
    MalformedLine { line: usize, text: String },

    #[error("line {line}: semantic ID is empty")]
    EmptySemanticId { line: usize },
}

pub type Result<T> = std::result::Result<T, FormatEError>;
