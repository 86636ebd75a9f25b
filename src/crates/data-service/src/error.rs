use thiserror::Error;

/// Errors raised by the Unified Data Service's side stores. Graph reads and
/// writes pass through [`graph_core::GraphStoreError`] unchanged; this enum
/// covers the cache and episodic-memory layers the service adds on top.
#[derive(Debug, Error)]
pub enum DataServiceError {
    #[error(transparent)]
    Graph(#[from] graph_core::GraphStoreError),

    #[error(transparent)]
    Apply(#[from] graph_core::ApplyError),
}

pub type Result<T> = std::result::Result<T, DataServiceError>;
