//! The pure `(nodes, edges, options) -> renderData` transformation.
//! Everything here is a free function over plain data so it can be unit
//! tested without a live `GraphStore`.

use format_e::{EdgeType, NodeType};
use graph_core::{Edge, Node};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Hierarchy,
    Allocation,
    Traceability,
    Dependency,
    Fchain,
    All,
}

impl View {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "hierarchy" => Self::Hierarchy,
            "allocation" => Self::Allocation,
            "traceability" => Self::Traceability,
            "dependency" => Self::Dependency,
            "fchain" => Self::Fchain,
            "all" => Self::All,
            _ => return None,
        })
    }

    /// The substrings an edge type's label must contain at least one of to
    /// survive this view's edge filter.
    fn allowed_substrings(&self) -> &'static [&'static str] {
        match self {
            Self::Hierarchy => &["compose", "contains", "parent"],
            Self::Allocation => &["allocate", "realize", "implement"],
            Self::Traceability => &["trace", "derive", "satisfy", "verify"],
            Self::Dependency => &["depend", "use", "require", "import"],
            Self::Fchain => &["flow", "trigger", "signal", "data", "io"],
            Self::All => &[],
        }
    }

    fn allows(&self, edge_type: EdgeType) -> bool {
        if matches!(self, Self::All) {
            return true;
        }
        let label = edge_label(edge_type);
        self.allowed_substrings().iter().any(|s| label.contains(s))
    }
}

/// An edge type's word label, for substring matching against a view's
/// allowed set. `EdgeType::arrow()` gives the short Format E code instead;
/// this is the full word form each view's allowed-substring list is phrased in.
fn edge_label(edge_type: EdgeType) -> &'static str {
    match edge_type {
        EdgeType::Compose => "compose",
        EdgeType::Io => "io",
        EdgeType::Satisfy => "satisfy",
        EdgeType::Verify => "verify",
        EdgeType::Allocate => "allocate",
        EdgeType::Relation => "relation",
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderFilter {
    pub node_types: Option<HashSet<NodeType>>,
    pub phase: Option<i64>,
    pub show_deleted: bool,
    pub search_term: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub view: View,
    pub filter: RenderFilter,
    pub selection: HashSet<String>,
    pub focus: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub semantic_id: String,
    pub node_type: NodeType,
    pub name: String,
    pub focused: bool,
    pub selected: bool,
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderData {
    pub roots: Vec<TreeNode>,
    pub ascii: String,
}

fn node_matches_filter(node: &Node, filter: &RenderFilter) -> bool {
    if let Some(types) = &filter.node_types {
        if !types.contains(&node.node_type) {
            return false;
        }
    }
    if let Some(phase) = filter.phase {
        let node_phase = node.attributes.get("phase").and_then(|v| v.as_i64());
        if node_phase != Some(phase) {
            return false;
        }
    }
    if !filter.show_deleted {
        if node.attributes.get("deleted").and_then(|v| v.as_bool()) == Some(true) {
            return false;
        }
    }
    if let Some(term) = &filter.search_term {
        let term = term.to_ascii_lowercase();
        let haystack = format!("{} {}", node.name, node.description).to_ascii_lowercase();
        if !haystack.contains(&term) {
            return false;
        }
    }
    true
}

/// The pure renderer: filter nodes, filter edges by view, build a forest,
/// emit an ASCII indented tree.
pub fn render(nodes: &[Node], edges: &[Edge], options: &RenderOptions) -> RenderData {
    // 1. Filter nodes.
    let kept_nodes: Vec<&Node> = nodes.iter().filter(|n| node_matches_filter(n, &options.filter)).collect();
    let kept_ids: HashSet<&str> = kept_nodes.iter().map(|n| n.semantic_id.as_str()).collect();

    // 2. Filter edges: both endpoints must survive step 1, and the edge
    // type must be allowed by the view.
    let kept_edges: Vec<&Edge> = edges
        .iter()
        .filter(|e| kept_ids.contains(e.source_id.as_str()) && kept_ids.contains(e.target_id.as_str()))
        .filter(|e| options.view.allows(e.edge_type))
        .collect();

    // 3. Build a forest: a node is a root if it has no in-set parent, i.e.
    // no surviving edge targets it.
    let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_parent: HashSet<&str> = HashSet::new();
    for edge in &kept_edges {
        children_of.entry(edge.source_id.as_str()).or_default().push(edge.target_id.as_str());
        has_parent.insert(edge.target_id.as_str());
    }

    let by_id: HashMap<&str, &Node> = kept_nodes.iter().map(|n| (n.semantic_id.as_str(), *n)).collect();

    let mut roots: Vec<&str> = kept_nodes
        .iter()
        .map(|n| n.semantic_id.as_str())
        .filter(|id| !has_parent.contains(id))
        .collect();
    roots.sort_unstable();

    let mut visited: HashSet<&str> = HashSet::new();
    let tree_roots: Vec<TreeNode> =
        roots.into_iter().filter_map(|id| build_tree(id, &by_id, &children_of, options, &mut visited)).collect();

    let mut ascii = String::new();
    for root in &tree_roots {
        write_ascii(root, 0, &mut ascii);
    }

    RenderData { roots: tree_roots, ascii }
}

fn build_tree<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a Node>,
    children_of: &HashMap<&'a str, Vec<&'a str>>,
    options: &RenderOptions,
    visited: &mut HashSet<&'a str>,
) -> Option<TreeNode> {
    if !visited.insert(id) {
        // Cycle guard: a node already placed elsewhere in the forest is not
        // repeated.
        return None;
    }
    let node = *by_id.get(id)?;
    let mut children: Vec<&str> = children_of.get(id).cloned().unwrap_or_default();
    children.sort_unstable();
    let children = children.into_iter().filter_map(|c| build_tree(c, by_id, children_of, options, visited)).collect();

    Some(TreeNode {
        semantic_id: node.semantic_id.clone(),
        node_type: node.node_type,
        name: node.name.clone(),
        focused: options.focus.as_deref() == Some(node.semantic_id.as_str()),
        selected: options.selection.contains(&node.semantic_id),
        children,
    })
}

fn write_ascii(node: &TreeNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let mut marker = String::new();
    if node.focused {
        marker.push_str(" <focus>");
    }
    if node.selected {
        marker.push_str(" <selected>");
    }
    out.push_str(&format!("{indent}[{}] {}{}\n", node.node_type.abbr(), node.name, marker));
    for child in &node.children {
        write_ascii(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn node(id: &str, node_type: NodeType) -> Node {
        Node::new(id, node_type, "", Map::new())
    }

    fn node_with_phase(id: &str, node_type: NodeType, phase: i64) -> Node {
        let mut attrs = Map::new();
        attrs.insert("phase".into(), phase.into());
        Node::new(id, node_type, "", attrs)
    }

    #[test]
    fn hierarchy_view_keeps_only_compose_edges_and_builds_a_forest() {
        let nodes = vec![node("Sys.SYS.001", NodeType::Sys), node("Func.FUNC.001", NodeType::Func)];
        let edges = vec![Edge::new("Sys.SYS.001", EdgeType::Compose, "Func.FUNC.001")];
        let options =
            RenderOptions { view: View::Hierarchy, filter: RenderFilter::default(), selection: Default::default(), focus: None };

        let data = render(&nodes, &edges, &options);
        assert_eq!(data.roots.len(), 1);
        assert_eq!(data.roots[0].semantic_id, "Sys.SYS.001");
        assert_eq!(data.roots[0].children.len(), 1);
        assert_eq!(data.roots[0].children[0].semantic_id, "Func.FUNC.001");
    }

    #[test]
    fn dependency_view_drops_compose_edges_leaving_both_nodes_as_roots() {
        let nodes = vec![node("Sys.SYS.001", NodeType::Sys), node("Func.FUNC.001", NodeType::Func)];
        let edges = vec![Edge::new("Sys.SYS.001", EdgeType::Compose, "Func.FUNC.001")];
        let options =
            RenderOptions { view: View::Dependency, filter: RenderFilter::default(), selection: Default::default(), focus: None };

        let data = render(&nodes, &edges, &options);
        assert_eq!(data.roots.len(), 2);
    }

    #[test]
    fn phase_filter_excludes_nodes_outside_the_requested_phase() {
        let nodes = vec![node_with_phase("A.SYS.001", NodeType::Sys, 1), node_with_phase("B.SYS.002", NodeType::Sys, 2)];
        let filter = RenderFilter { phase: Some(1), ..Default::default() };
        let options = RenderOptions { view: View::All, filter, selection: Default::default(), focus: None };

        let data = render(&nodes, &[], &options);
        assert_eq!(data.roots.len(), 1);
        assert_eq!(data.roots[0].semantic_id, "A.SYS.001");
    }

    #[test]
    fn focus_and_selection_are_decorated_in_the_ascii_output() {
        let nodes = vec![node("A.SYS.001", NodeType::Sys)];
        let options = RenderOptions {
            view: View::All,
            filter: RenderFilter::default(),
            selection: [String::from("A.SYS.001")].into_iter().collect(),
            focus: Some("A.SYS.001".to_string()),
        };

        let data = render(&nodes, &[], &options);
        assert!(data.ascii.contains("<focus>"));
        assert!(data.ascii.contains("<selected>"));
    }

    #[test]
    fn search_term_filters_by_name_or_description() {
        let nodes = vec![node("ProcessPayment.FUNC.001", NodeType::Func), node("SendEmail.FUNC.002", NodeType::Func)];
        let filter = RenderFilter { search_term: Some("payment".into()), ..Default::default() };
        let options = RenderOptions { view: View::All, filter, selection: Default::default(), focus: None };

        let data = render(&nodes, &[], &options);
        assert_eq!(data.roots.len(), 1);
        assert_eq!(data.roots[0].semantic_id, "ProcessPayment.FUNC.001");
    }
}
