use crate::edge::{Edge, EdgeKey};
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Which side of an edge to traverse from a given node when walking
/// adjacency: edges where the node is the source, the target, or either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

/// A snapshot of the whole graph: nodes keyed by semantic ID, edges keyed by
/// composite key, adjacency indices, and the monotonic version counter.
///
/// This is the plain-data shape returned by [`crate::store::GraphStore::to_graph_state`]
/// and accepted by [`crate::store::GraphStore::load_from_state`]; the store
/// itself additionally holds dirty tracking and the subscriber list, neither
/// of which belongs in a serialized snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    pub nodes: BTreeMap<String, Node>,
    pub edges: BTreeMap<EdgeKeyOrd, Edge>,
    pub version: u64,
    pub last_saved_version: u64,
}

/// `EdgeKey` wrapped so it has a total, stable ordering for use as a
/// `BTreeMap` key independent of `format_e::EdgeType`'s declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKeyOrd(pub String, pub String, pub String);

impl From<&EdgeKey> for EdgeKeyOrd {
    fn from(key: &EdgeKey) -> Self {
        EdgeKeyOrd(key.0.clone(), key.1.arrow().to_string(), key.2.clone())
    }
}

impl GraphState {
    pub fn is_dirty(&self) -> bool {
        self.version != self.last_saved_version
    }
}

/// In-memory adjacency indices over a [`GraphState`]'s edges, kept in sync
/// with the edge map on every mutation. Rebuilt wholesale on
/// [`crate::store::GraphStore::load_from_state`] rather than maintained
/// incrementally across a full replace.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyIndex {
    pub out_edges: HashMap<String, Vec<EdgeKeyOrd>>,
    pub in_edges: HashMap<String, Vec<EdgeKeyOrd>>,
}

impl AdjacencyIndex {
    pub fn rebuild(edges: &BTreeMap<EdgeKeyOrd, Edge>) -> Self {
        let mut index = Self::default();
        for (key, edge) in edges {
            index
                .out_edges
                .entry(edge.source_id.clone())
                .or_default()
                .push(key.clone());
            index
                .in_edges
                .entry(edge.target_id.clone())
                .or_default()
                .push(key.clone());
        }
        index
    }

    pub fn insert(&mut self, edge: &Edge, key: EdgeKeyOrd) {
        self.out_edges
            .entry(edge.source_id.clone())
            .or_default()
            .push(key.clone());
        self.in_edges.entry(edge.target_id.clone()).or_default().push(key);
    }

    pub fn remove(&mut self, edge: &Edge, key: &EdgeKeyOrd) {
        if let Some(v) = self.out_edges.get_mut(&edge.source_id) {
            v.retain(|k| k != key);
        }
        if let Some(v) = self.in_edges.get_mut(&edge.target_id) {
            v.retain(|k| k != key);
        }
    }

    pub fn for_node(&self, semantic_id: &str, direction: Direction) -> Vec<EdgeKeyOrd> {
        match direction {
            Direction::Out => self.out_edges.get(semantic_id).cloned().unwrap_or_default(),
            Direction::In => self.in_edges.get(semantic_id).cloned().unwrap_or_default(),
            Direction::Both => {
                let mut out = self.out_edges.get(semantic_id).cloned().unwrap_or_default();
                out.extend(self.in_edges.get(semantic_id).cloned().unwrap_or_default());
                out
            }
        }
    }
}

/// Dirty tracking: semantic IDs and edge keys changed since the last
/// successful persistence. Survives a failed persistence attempt; cleared
/// only by [`crate::store::GraphStore::mark_persisted`] on success.
#[derive(Debug, Clone, Default)]
pub struct DirtySet {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<EdgeKeyOrd>,
}

impl DirtySet {
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
