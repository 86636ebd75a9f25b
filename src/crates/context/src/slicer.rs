//! Context Slicer: classifies a user message into a task tag and extracts
//! the minimal subgraph worth sending to the LLM.

use format_e::{EdgeType, NodeType};
use graph_core::{Direction, Edge, GraphStore, Node};
use std::collections::BTreeSet;

/// The classification priority order (checked top-down; the first
/// matching tag wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTag {
    DeriveTestcase,
    DetailUsecase,
    AllocateFunctions,
    ValidatePhase,
    General,
}

const DERIVE_TESTCASE_KEYWORDS: &[&str] = &["test", "verify", "coverage", "testcase", "testfall"];
const DETAIL_USECASE_KEYWORDS: &[&str] = &["detail", "refine", "elaborate", "use case", "anwendungsfall"];
const ALLOCATE_FUNCTIONS_KEYWORDS: &[&str] = &["allocate", "assign", "module", "zuweisen"];
const VALIDATE_PHASE_KEYWORDS: &[&str] = &["validate", "check", "phase", "validier"];

/// Classify `message` by lowercased keyword match, top-down through the
/// priority order above.
pub fn classify(message: &str) -> TaskTag {
    let lower = message.to_lowercase();
    if DERIVE_TESTCASE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskTag::DeriveTestcase
    } else if DETAIL_USECASE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskTag::DetailUsecase
    } else if ALLOCATE_FUNCTIONS_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskTag::AllocateFunctions
    } else if VALIDATE_PHASE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskTag::ValidatePhase
    } else {
        TaskTag::General
    }
}

/// A minimal subgraph extracted as LLM context for one turn.
#[derive(Debug, Clone)]
pub struct GraphSlice {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub focus_node: Option<String>,
    pub depth: usize,
    pub estimated_tokens: usize,
}

pub struct ContextSlicer {
    /// Maximum neighbor-expansion iterations for tags whose strategy names
    /// a depth; `validate-phase`'s "no depth limit" is implemented as
    /// expansion to a fixpoint instead, bounded by this as a safety cap.
    pub max_depth: usize,
}

impl Default for ContextSlicer {
    fn default() -> Self {
        Self { max_depth: 8 }
    }
}

impl ContextSlicer {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Build a [`GraphSlice`] for `message` against `store`, with an
    /// optional phase hint used by the `validate-phase` strategy.
    pub fn slice(&self, store: &GraphStore, message: &str, phase_hint: Option<i64>) -> GraphSlice {
        let tag = classify(message);
        let all_nodes = store.get_all_nodes();

        let (seed, depth, focus): (BTreeSet<String>, usize, Option<String>) = match tag {
            TaskTag::DeriveTestcase => (
                filter_by_type(&all_nodes, &[NodeType::Req, NodeType::Sys]),
                1,
                None,
            ),
            TaskTag::DetailUsecase => (filter_by_type(&all_nodes, &[NodeType::Uc]), 2, None),
            TaskTag::AllocateFunctions => (
                filter_by_type(&all_nodes, &[NodeType::Func, NodeType::Mod]),
                2,
                None,
            ),
            TaskTag::ValidatePhase => {
                let phase_num = phase_hint.unwrap_or(i64::MAX);
                let seed: BTreeSet<String> = all_nodes
                    .iter()
                    .filter(|n| node_phase(n).map(|p| p <= phase_num).unwrap_or(false))
                    .map(|n| n.semantic_id.clone())
                    .collect();
                (seed, self.max_depth, None)
            }
            TaskTag::General => {
                let mentioned = mentioned_nodes(&all_nodes, message);
                if !mentioned.is_empty() {
                    (mentioned, 3, None)
                } else {
                    let roots: BTreeSet<String> = filter_by_type(&all_nodes, &[NodeType::Sys]);
                    (roots, 3, None)
                }
            }
        };

        let (nodes, edges) = expand(store, &seed, depth);
        let text = render_snapshot(&nodes, &edges);
        GraphSlice {
            nodes,
            edges,
            focus_node: focus,
            depth,
            estimated_tokens: estimate_tokens(&text),
        }
    }

    /// Drop the outermost nodes (by re-slicing at a smaller depth) until the
    /// estimate fits `budget`, floored at depth 1.
    pub fn prune_to_fit(&self, store: &GraphStore, slice: GraphSlice, budget: usize, message: &str, phase_hint: Option<i64>) -> GraphSlice {
        let mut current = slice;
        let mut depth = current.depth;
        while current.estimated_tokens > budget && depth > 1 {
            depth -= 1;
            let tag = classify(message);
            let all_nodes = store.get_all_nodes();
            let seed = reseed(tag, &all_nodes, message, phase_hint);
            let (nodes, edges) = expand(store, &seed, depth);
            let text = render_snapshot(&nodes, &edges);
            current = GraphSlice {
                estimated_tokens: estimate_tokens(&text),
                nodes,
                edges,
                focus_node: current.focus_node,
                depth,
            };
        }
        current
    }

    /// Human-readable (non-Format-E) rendering for LLM consumption, grouped
    /// by node type with a trailing relationships list.
    pub fn serialize(&self, slice: &GraphSlice) -> String {
        render_snapshot(&slice.nodes, &slice.edges)
    }
}

fn reseed(tag: TaskTag, all_nodes: &[Node], message: &str, phase_hint: Option<i64>) -> BTreeSet<String> {
    match tag {
        TaskTag::DeriveTestcase => filter_by_type(all_nodes, &[NodeType::Req, NodeType::Sys]),
        TaskTag::DetailUsecase => filter_by_type(all_nodes, &[NodeType::Uc]),
        TaskTag::AllocateFunctions => filter_by_type(all_nodes, &[NodeType::Func, NodeType::Mod]),
        TaskTag::ValidatePhase => {
            let phase_num = phase_hint.unwrap_or(i64::MAX);
            all_nodes
                .iter()
                .filter(|n| node_phase(n).map(|p| p <= phase_num).unwrap_or(false))
                .map(|n| n.semantic_id.clone())
                .collect()
        }
        TaskTag::General => {
            let mentioned = mentioned_nodes(all_nodes, message);
            if !mentioned.is_empty() {
                mentioned
            } else {
                filter_by_type(all_nodes, &[NodeType::Sys])
            }
        }
    }
}

fn filter_by_type(nodes: &[Node], types: &[NodeType]) -> BTreeSet<String> {
    nodes
        .iter()
        .filter(|n| types.contains(&n.node_type))
        .map(|n| n.semantic_id.clone())
        .collect()
}

fn node_phase(node: &Node) -> Option<i64> {
    node.attributes.get("phase").and_then(|v| v.as_i64())
}

fn mentioned_nodes(nodes: &[Node], message: &str) -> BTreeSet<String> {
    let lower = message.to_lowercase();
    nodes
        .iter()
        .filter(|n| lower.contains(&n.semantic_id.to_lowercase()) || lower.contains(&n.name.to_lowercase()))
        .map(|n| n.semantic_id.clone())
        .collect()
}

/// Repeatedly add any neighbor reachable by one edge from the current set,
/// up to `depth` iterations, collecting every edge with at least one
/// endpoint in the growing set.
fn expand(store: &GraphStore, seed: &BTreeSet<String>, depth: usize) -> (Vec<Node>, Vec<Edge>) {
    let mut included: BTreeSet<String> = seed.clone();
    for _ in 0..depth {
        let mut added = false;
        let frontier: Vec<String> = included.iter().cloned().collect();
        for id in frontier {
            for edge in store.get_edges_for(&id, Direction::Both) {
                if included.insert(edge.source_id.clone()) {
                    added = true;
                }
                if included.insert(edge.target_id.clone()) {
                    added = true;
                }
            }
        }
        if !added {
            break;
        }
    }

    let mut nodes: Vec<Node> = included.iter().filter_map(|id| store.get_node(id)).collect();
    nodes.sort_by(|a, b| a.semantic_id.cmp(&b.semantic_id));

    let mut edges: Vec<Edge> = Vec::new();
    let mut seen = BTreeSet::new();
    for id in &included {
        for edge in store.get_edges_for(id, Direction::Both) {
            if included.contains(&edge.source_id) && included.contains(&edge.target_id) {
                let key = (edge.source_id.clone(), edge.edge_type, edge.target_id.clone());
                if seen.insert(key) {
                    edges.push(edge);
                }
            }
        }
    }
    edges.sort_by(|a, b| (&a.source_id, a.edge_type.arrow(), &a.target_id).cmp(&(&b.source_id, b.edge_type.arrow(), &b.target_id)));

    (nodes, edges)
}

/// Rough token estimate: `ceil(serializedChars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

fn render_snapshot(nodes: &[Node], edges: &[Edge]) -> String {
    let mut out = String::new();
    let mut by_type: std::collections::BTreeMap<NodeType, Vec<&Node>> = std::collections::BTreeMap::new();
    for n in nodes {
        by_type.entry(n.node_type).or_default().push(n);
    }
    for (node_type, group) in &by_type {
        out.push_str(&format!("## {}\n", node_type));
        for n in group {
            out.push_str(&format!("- {} :: {}\n", n.semantic_id, n.description));
        }
        out.push('\n');
    }
    out.push_str("## Relationships\n");
    for e in edges {
        out.push_str(&format!("- {} -{}-> {}\n", e.source_id, edge_label(e.edge_type), e.target_id));
    }
    out
}

fn edge_label(t: EdgeType) -> &'static str {
    t.arrow()
}
