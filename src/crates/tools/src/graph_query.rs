//! `graph_query`: the one tool the LLM may invoke mid-response to inspect
//! the graph. Four query types: `edges`, `nodes`, `check_edge`, `io_chain`.

use crate::error::{Result, ToolError};
use crate::registry::GraphTool;
use async_trait::async_trait;
use format_e::{EdgeType, NodeType};
use graph_core::{Direction, Edge, GraphStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQueryFilters {
    #[serde(default, deserialize_with = "deserialize_opt_node_type")]
    pub source_type: Option<NodeType>,
    #[serde(default, deserialize_with = "deserialize_opt_node_type")]
    pub target_type: Option<NodeType>,
    #[serde(default, deserialize_with = "deserialize_opt_edge_type")]
    pub edge_type: Option<EdgeType>,
    #[serde(default, deserialize_with = "deserialize_opt_node_type")]
    pub node_type: Option<NodeType>,
    pub semantic_id: Option<String>,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
    pub fchain_id: Option<String>,
}

/// Node/edge type filters arrive as the same tags Format E and the ontology
/// use (`"FUNC"`, `"io"`), not the default serde derive's Rust variant
/// names (`"Func"`, `"Io"`) — route through the shared abbreviation/arrow
/// parsers instead of deriving `Deserialize` on `NodeType`/`EdgeType` directly.
fn deserialize_opt_node_type<'de, D>(deserializer: D) -> std::result::Result<Option<NodeType>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        NodeType::from_abbr(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown node type tag: {s}")))
    })
    .transpose()
}

fn deserialize_opt_edge_type<'de, D>(deserializer: D) -> std::result::Result<Option<EdgeType>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        EdgeType::from_arrow(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown edge arrow tag: {s}")))
    })
    .transpose()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Edges,
    Nodes,
    CheckEdge,
    IoChain,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQueryParams {
    pub query_type: QueryType,
    #[serde(default)]
    pub filters: GraphQueryFilters,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEdge {
    pub source_id: String,
    pub edge_type: EdgeType,
    pub target_id: String,
    pub source_type: Option<NodeType>,
    pub target_type: Option<NodeType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckEdgeResult {
    pub exists: bool,
    pub edge: Option<EnrichedEdge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IoChainStep {
    pub from_node: String,
    pub flow_node: String,
    pub to_node: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IoChainIssueKind {
    Bidirectional,
    Circular,
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct IoChainIssue {
    pub kind: IoChainIssueKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IoChainResult {
    pub steps: Vec<IoChainStep>,
    pub issues: Vec<IoChainIssue>,
}

pub struct GraphQueryTool;

#[async_trait]
impl GraphTool for GraphQueryTool {
    fn name(&self) -> &str {
        "graph_query"
    }

    fn description(&self) -> &str {
        "Inspect the current graph: list edges/nodes matching filters, check whether a specific edge exists, or walk an FCHAIN's io chain for issues."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["queryType"],
            "properties": {
                "queryType": {"type": "string", "enum": ["edges", "nodes", "check_edge", "io_chain"]},
                "filters": {
                    "type": "object",
                    "properties": {
                        "sourceType": {"type": "string"},
                        "targetType": {"type": "string"},
                        "edgeType": {"type": "string"},
                        "nodeType": {"type": "string"},
                        "semanticId": {"type": "string"},
                        "sourceId": {"type": "string"},
                        "targetId": {"type": "string"},
                        "fchainId": {"type": "string"}
                    }
                }
            }
        })
    }

    async fn execute(&self, store: &GraphStore, params: Value) -> Result<Value> {
        let params: GraphQueryParams = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameter("params", e.to_string()))?;

        let result = match params.query_type {
            QueryType::Edges => serde_json::to_value(query_edges(store, &params.filters)),
            QueryType::Nodes => serde_json::to_value(query_nodes(store, &params.filters)),
            QueryType::CheckEdge => serde_json::to_value(query_check_edge(store, &params.filters)?),
            QueryType::IoChain => serde_json::to_value(query_io_chain(store, &params.filters)?),
        };
        result.map_err(|e| ToolError::InvalidParameter("result", e.to_string()))
    }
}

fn enrich(store: &GraphStore, edge: &Edge) -> EnrichedEdge {
    EnrichedEdge {
        source_id: edge.source_id.clone(),
        edge_type: edge.edge_type,
        target_id: edge.target_id.clone(),
        source_type: store.get_node(&edge.source_id).map(|n| n.node_type),
        target_type: store.get_node(&edge.target_id).map(|n| n.node_type),
    }
}

fn query_edges(store: &GraphStore, filters: &GraphQueryFilters) -> Vec<EnrichedEdge> {
    store
        .get_all_edges()
        .into_iter()
        .filter(|e| filters.edge_type.map(|t| t == e.edge_type).unwrap_or(true))
        .filter(|e| filters.source_id.as_deref().map(|id| id == e.source_id).unwrap_or(true))
        .filter(|e| filters.target_id.as_deref().map(|id| id == e.target_id).unwrap_or(true))
        .map(|e| enrich(store, &e))
        .filter(|e| filters.source_type.map(|t| Some(t) == e.source_type).unwrap_or(true))
        .filter(|e| filters.target_type.map(|t| Some(t) == e.target_type).unwrap_or(true))
        .collect()
}

fn query_nodes(store: &GraphStore, filters: &GraphQueryFilters) -> Vec<graph_core::Node> {
    store
        .get_all_nodes()
        .into_iter()
        .filter(|n| filters.node_type.map(|t| t == n.node_type).unwrap_or(true))
        .filter(|n| filters.semantic_id.as_deref().map(|id| id == n.semantic_id).unwrap_or(true))
        .collect()
}

fn query_check_edge(store: &GraphStore, filters: &GraphQueryFilters) -> Result<CheckEdgeResult> {
    let source_id = filters.source_id.clone().ok_or(ToolError::MissingParameter("sourceId"))?;
    let target_id = filters.target_id.clone().ok_or(ToolError::MissingParameter("targetId"))?;

    let found = store.get_all_edges().into_iter().find(|e| {
        e.source_id == source_id
            && e.target_id == target_id
            && filters.edge_type.map(|t| t == e.edge_type).unwrap_or(true)
    });

    Ok(CheckEdgeResult {
        exists: found.is_some(),
        edge: found.map(|e| enrich(store, &e)),
    })
}

/// Expands an FCHAIN's children via `compose` edges, then reconstructs an
/// ordered chain of `(fromNode, flowNode, toNode)` steps from the `io`
/// edges touching those children's FLOW nodes, flagging bidirectional,
/// circular, and duplicate-edge issues.
fn query_io_chain(store: &GraphStore, filters: &GraphQueryFilters) -> Result<IoChainResult> {
    let fchain_id = filters.fchain_id.clone().ok_or(ToolError::MissingParameter("fchainId"))?;

    let children: Vec<String> = store
        .get_edges_for(&fchain_id, Direction::Out)
        .into_iter()
        .filter(|e| e.edge_type == EdgeType::Compose)
        .map(|e| e.target_id)
        .collect();

    let mut children_set = std::collections::BTreeSet::new();
    children_set.extend(children.iter().cloned());

    let all_edges = store.get_all_edges();
    let io_edges: Vec<&Edge> = all_edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Io)
        .filter(|e| children_set.contains(&e.source_id) || children_set.contains(&e.target_id))
        .collect();

    // Duplicate detection: the store's composite key already forbids exact
    // duplicates, but this tool reasons over a plain list so it re-checks
    // independently.
    let mut seen = std::collections::HashMap::new();
    let mut issues = Vec::new();
    for e in &io_edges {
        let key = (e.source_id.clone(), e.target_id.clone());
        *seen.entry(key.clone()).or_insert(0) += 1;
        if seen[&key] == 2 {
            issues.push(IoChainIssue {
                kind: IoChainIssueKind::Duplicate,
                detail: format!("{} -io-> {} appears more than once", key.0, key.1),
            });
        }
    }

    // FLOW nodes among the fchain's children, plus any FLOW node outside it
    // that still participates in an io edge with a child.
    let mut flow_ids: std::collections::BTreeSet<String> = children
        .iter()
        .filter_map(|id| store.get_node(id))
        .filter(|n| n.node_type == NodeType::Flow)
        .map(|n| n.semantic_id)
        .collect();
    for e in &io_edges {
        if let Some(n) = store.get_node(&e.source_id) {
            if n.node_type == NodeType::Flow {
                flow_ids.insert(n.semantic_id);
            }
        }
        if let Some(n) = store.get_node(&e.target_id) {
            if n.node_type == NodeType::Flow {
                flow_ids.insert(n.semantic_id);
            }
        }
    }

    let mut steps = Vec::new();
    for flow in &flow_ids {
        let writers: Vec<&Edge> = io_edges.iter().filter(|e| &e.target_id == flow).copied().collect();
        let readers: Vec<&Edge> = io_edges.iter().filter(|e| &e.source_id == flow).copied().collect();

        for writer in &writers {
            for reader in &readers {
                steps.push(IoChainStep {
                    from_node: writer.source_id.clone(),
                    flow_node: flow.clone(),
                    to_node: reader.target_id.clone(),
                });

                if writer.source_id == reader.target_id {
                    issues.push(IoChainIssue {
                        kind: IoChainIssueKind::Circular,
                        detail: format!("{} both writes and reads {} in a cycle", writer.source_id, flow),
                    });
                }
            }
        }

        // Bidirectional: the same pair writes AND reads the same flow —
        // i.e. some node is both a writer and a reader of this flow.
        let writer_ids: std::collections::BTreeSet<&str> = writers.iter().map(|e| e.source_id.as_str()).collect();
        let reader_ids: std::collections::BTreeSet<&str> = readers.iter().map(|e| e.target_id.as_str()).collect();
        for id in writer_ids.intersection(&reader_ids) {
            issues.push(IoChainIssue {
                kind: IoChainIssueKind::Bidirectional,
                detail: format!("{} both writes and reads {}", id, flow),
            });
        }
    }

    Ok(IoChainResult { steps, issues })
}
