use format_e::EdgeType;
use thiserror::Error;

/// Errors raised by [`crate::store::GraphStore`] writes and lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphStoreError {
    #[error("node with semantic ID {0:?} already exists")]
    DuplicateSemanticId(String),

    #[error("edge ({0:?}, {1}, {2:?}) already exists")]
    DuplicateEdge(String, EdgeType, String),

    #[error("no node with semantic ID {0:?}")]
    NodeNotFound(String),

    #[error("no edge with key ({0:?}, {1}, {2:?})")]
    EdgeNotFound(String, EdgeType, String),

    #[error("no edge with uuid {0}")]
    EdgeNotFoundByUuid(uuid::Uuid),
}

pub type Result<T> = std::result::Result<T, GraphStoreError>;
