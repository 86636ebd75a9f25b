//! Types produced by [`crate::parser::parse_diff`] and consumed by
//! [`crate::serializer::serialize_diff`] / [`crate::serializer::serialize_graph`].

use crate::types::{EdgeType, NodeType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single mutation against a node, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeOp {
    /// `+ SemanticId|Description [key:value, ...]`
    Add {
        semantic_id: String,
        node_type: NodeType,
        description: String,
        attributes: Map<String, Value>,
    },
    /// `- SemanticId`
    Remove { semantic_id: String },
    /// `~ SemanticId|Description [key:value, ...]` — merges onto the existing node.
    Update {
        semantic_id: String,
        description: Option<String>,
        attributes: Map<String, Value>,
    },
}

impl NodeOp {
    pub fn semantic_id(&self) -> &str {
        match self {
            Self::Add { semantic_id, .. }
            | Self::Remove { semantic_id }
            | Self::Update { semantic_id, .. } => semantic_id,
        }
    }
}

/// A single mutation against an edge, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeOp {
    /// `+ SourceId -arrow-> TargetId`
    Add {
        source_id: String,
        edge_type: EdgeType,
        target_id: String,
    },
    /// `- SourceId -arrow-> TargetId`
    Remove {
        source_id: String,
        edge_type: EdgeType,
        target_id: String,
    },
}

/// The fully-parsed contents of an `<operations>` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatEDiff {
    /// `(systemId, version)` from an optional `<base_snapshot>SYS_ID@vN</base_snapshot>` line.
    pub base_snapshot: Option<(String, u64)>,
    /// An optional `<view_context>viewname</view_context>` line.
    pub view_context: Option<String>,
    pub node_ops: Vec<NodeOp>,
    pub edge_ops: Vec<EdgeOp>,
}

/// A node projected for [`crate::serializer::serialize_graph`]. `graph-core`
/// builds one of these per node when it needs a textual snapshot; format-e
/// stays ignorant of the store's own `Node` type to avoid a dependency cycle.
#[derive(Debug, Clone)]
pub struct SnapshotNode<'a> {
    pub semantic_id: &'a str,
    pub description: &'a str,
    pub attributes: &'a Map<String, Value>,
}

/// An edge projected for [`crate::serializer::serialize_graph`].
#[derive(Debug, Clone)]
pub struct SnapshotEdge<'a> {
    pub source_id: &'a str,
    pub edge_type: EdgeType,
    pub target_id: &'a str,
}

/// Composite sort/equality key mirroring the Graph Store's edge index key.
pub type EdgeKey = (String, EdgeType, String);

/// Attributes merge helper used by both the parser (building an `Update` op)
/// and by any caller applying one: later keys overwrite earlier ones.
pub fn merge_attributes(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged: BTreeMap<String, Value> =
        base.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    for (k, v) in overlay {
        merged.insert(k.clone(), v.clone());
    }
    merged.into_iter().collect()
}
