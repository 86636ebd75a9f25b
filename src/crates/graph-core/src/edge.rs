use format_e::EdgeType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directed, typed relationship between two nodes, referenced by their
/// semantic IDs. Equality for uniqueness purposes is the composite key
/// `(source_id, edge_type, target_id)`, not `uuid` — two edges with the same
/// endpoints and type are the same edge even if they were created in
/// separate diffs, which is why [`crate::store::GraphStore::set_edge`]
/// rejects duplicates under `upsert: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub uuid: Uuid,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new(source_id: impl Into<String>, edge_type: EdgeType, target_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
        }
    }

    /// The composite `(source_id, edge_type, target_id)` uniqueness key.
    pub fn key(&self) -> EdgeKey {
        (self.source_id.clone(), self.edge_type, self.target_id.clone())
    }
}

/// `(source_id, edge_type, target_id)` — the composite key used by the
/// Graph Store's edge index and adjacency indices.
pub type EdgeKey = (String, EdgeType, String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_endpoints_and_type() {
        let edge = Edge::new("A.SYS.001", EdgeType::Io, "B.SYS.002");
        assert_eq!(
            edge.key(),
            ("A.SYS.001".to_string(), EdgeType::Io, "B.SYS.002".to_string())
        );
    }
}
