//! The Graph Store: a typed, versioned, in-memory graph of Format E nodes
//! and edges, with adjacency indices, dirty tracking, and a synchronous
//! change-event feed.
//!
//! This crate owns the data model (`Node`, `Edge`, `GraphState`) and the
//! single-instance, multi-reader/single-writer store built on top of it
//! (`GraphStore`). Nothing outside `GraphStore` holds the authoritative
//! node/edge maps; the `data-service` crate wraps one `GraphStore` per
//! workspace/system and adds the response cache and episodic memory.

pub mod edge;
pub mod error;
pub mod node;
pub mod state;
pub mod store;

pub use edge::{Edge, EdgeKey};
pub use error::{GraphStoreError, Result};
pub use node::Node;
pub use state::{AdjacencyIndex, Direction, DirtySet, EdgeKeyOrd, GraphState};
pub use store::{ApplyError, ChangeKind, GraphChangeEvent, GraphStats, GraphStore};
