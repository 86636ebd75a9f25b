//! The Unified Data Service: wraps a `graph-core` store and adds a
//! similarity-scoped response cache and an append-only episodic memory.
//! Exactly one instance exists per `(workspaceId, systemId)` pair,
//! process-wide.

pub mod cache;
pub mod embedding;
pub mod episode;
pub mod error;
pub mod service;

pub use cache::{CacheRecord, ResponseCache, DEFAULT_TTL_SECS, SIMILARITY_THRESHOLD};
pub use embedding::{cosine_similarity, Embedder, HashingEmbedder};
pub use episode::{Episode, EpisodicMemory};
pub use error::{DataServiceError, Result};
pub use service::{clear_registry, unified_data_service, unified_data_service_with_embedder, UnifiedDataService};
