//! `serializeDiff` and `serializeGraph` — the write side of the codec.

use crate::diff::{EdgeOp, FormatEDiff, NodeOp, SnapshotEdge, SnapshotNode};
use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Serialize a parsed diff back to Format E text. Round-trips any diff
/// produced by [`crate::parser::parse_diff`]: parsing the output again
/// yields an equal [`FormatEDiff`].
pub fn serialize_diff(diff: &FormatEDiff) -> String {
    let mut out = String::new();

    if let Some((id, version)) = &diff.base_snapshot {
        let _ = writeln!(out, "<base_snapshot>{id}@v{version}</base_snapshot>");
    }
    if let Some(view) = &diff.view_context {
        let _ = writeln!(out, "<view_context>{view}</view_context>");
    }

    if !diff.node_ops.is_empty() {
        out.push_str("## Nodes\n");
        for op in &diff.node_ops {
            writeln_node_op(&mut out, op);
        }
    }
    if !diff.edge_ops.is_empty() {
        out.push_str("## Edges\n");
        for op in &diff.edge_ops {
            writeln_edge_op(&mut out, op);
        }
    }

    out
}

fn writeln_node_op(out: &mut String, op: &NodeOp) {
    match op {
        NodeOp::Add {
            semantic_id,
            description,
            attributes,
            ..
        } => {
            let _ = writeln!(
                out,
                "+ {semantic_id}|{description}{}",
                format_attributes(attributes)
            );
        }
        NodeOp::Remove { semantic_id } => {
            let _ = writeln!(out, "- {semantic_id}");
        }
        NodeOp::Update {
            semantic_id,
            description,
            attributes,
        } => {
            let desc = description.as_deref().unwrap_or("");
            let _ = writeln!(
                out,
                "~ {semantic_id}|{desc}{}",
                format_attributes(attributes)
            );
        }
    }
}

fn writeln_edge_op(out: &mut String, op: &EdgeOp) {
    match op {
        EdgeOp::Add {
            source_id,
            edge_type,
            target_id,
        } => {
            let _ = writeln!(out, "+ {source_id} -{}-> {target_id}", edge_type.arrow());
        }
        EdgeOp::Remove {
            source_id,
            edge_type,
            target_id,
        } => {
            let _ = writeln!(out, "- {source_id} -{}-> {target_id}", edge_type.arrow());
        }
    }
}

fn format_attributes(attributes: &Map<String, Value>) -> String {
    if attributes.is_empty() {
        return String::new();
    }
    let entries: Vec<String> = attributes
        .iter()
        .map(|(k, v)| format!("{k}:{}", serde_json::to_string(v).unwrap_or_default()))
        .collect();
    format!(" [{}]", entries.join(", "))
}

/// Serialize a full graph snapshot as a diff containing only `+` operations:
/// nodes first (sorted by semantic ID), then edges (sorted lexicographically
/// by composite key).
pub fn serialize_graph<'a>(
    mut nodes: Vec<SnapshotNode<'a>>,
    mut edges: Vec<SnapshotEdge<'a>>,
    view_context: Option<&str>,
) -> String {
    nodes.sort_by(|a, b| a.semantic_id.cmp(b.semantic_id));
    edges.sort_by(|a, b| {
        (a.source_id, a.edge_type.arrow(), a.target_id).cmp(&(
            b.source_id,
            b.edge_type.arrow(),
            b.target_id,
        ))
    });

    let mut out = String::new();
    if let Some(view) = view_context {
        let _ = writeln!(out, "<view_context>{view}</view_context>");
    }

    out.push_str("## Nodes\n");
    for node in &nodes {
        let _ = writeln!(
            out,
            "+ {}|{}{}",
            node.semantic_id,
            node.description,
            format_attributes(node.attributes)
        );
    }

    out.push_str("## Edges\n");
    for edge in &edges {
        let _ = writeln!(
            out,
            "+ {} -{}-> {}",
            edge.source_id,
            edge.edge_type.arrow(),
            edge.target_id
        );
    }

    out
}
