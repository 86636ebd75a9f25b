//! The Graph Store: a typed, versioned, in-memory graph with indices and a
//! synchronous change-event feed. One instance lives inside each workspace's
//! Unified Data Service (see the `data-service` crate); nothing outside this
//! module holds the authoritative node/edge maps.
//!
//! Concurrency: writes are serialized by an internal [`parking_lot::Mutex`]
//! guarding the whole state. A reader observes either the pre- or
//! post-state of any single write, never a half-applied one; composing two
//! separate calls (e.g. a node lookup followed by an edge lookup) is not
//! transactional and may straddle an intervening write.

use crate::edge::{Edge, EdgeKey};
use crate::error::{GraphStoreError, Result};
use crate::node::Node;
use crate::state::{AdjacencyIndex, Direction, DirtySet, EdgeKeyOrd, GraphState};
use format_e::{parse_diff, serialize_graph, EdgeOp, FormatEDiff, NodeOp, SnapshotEdge, SnapshotNode};
use parking_lot::Mutex;
use std::sync::Arc;

/// The kind of mutation a [`GraphChangeEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

/// Emitted synchronously after every successful write.
#[derive(Debug, Clone)]
pub struct GraphChangeEvent {
    pub kind: ChangeKind,
    pub node_id: Option<String>,
    pub edge_key: Option<EdgeKey>,
    pub version: u64,
}

type Subscriber = Arc<dyn Fn(&GraphChangeEvent) + Send + Sync>;

/// Node/edge counts and dirty-set size, surfaced to the `/stats` slash
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub version: u64,
    pub dirty_count: usize,
}

struct Inner {
    state: GraphState,
    index: AdjacencyIndex,
    dirty: DirtySet,
    subscribers: Vec<Subscriber>,
}

pub struct GraphStore {
    inner: Mutex<Inner>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: GraphState::default(),
                index: AdjacencyIndex::default(),
                dirty: DirtySet::default(),
                subscribers: Vec::new(),
            }),
        }
    }

    // ---- reads ----

    pub fn get_node(&self, semantic_id: &str) -> Option<Node> {
        self.inner.lock().state.nodes.get(semantic_id).cloned()
    }

    pub fn get_all_nodes(&self) -> Vec<Node> {
        self.inner.lock().state.nodes.values().cloned().collect()
    }

    pub fn get_edge(&self, key: &EdgeKey) -> Option<Edge> {
        let ord: EdgeKeyOrd = key.into();
        self.inner.lock().state.edges.get(&ord).cloned()
    }

    pub fn get_all_edges(&self) -> Vec<Edge> {
        self.inner.lock().state.edges.values().cloned().collect()
    }

    pub fn get_edges_for(&self, semantic_id: &str, direction: Direction) -> Vec<Edge> {
        let guard = self.inner.lock();
        guard
            .index
            .for_node(semantic_id, direction)
            .into_iter()
            .filter_map(|key| guard.state.edges.get(&key).cloned())
            .collect()
    }

    pub fn get_version(&self) -> u64 {
        self.inner.lock().state.version
    }

    pub fn to_graph_state(&self) -> GraphState {
        self.inner.lock().state.clone()
    }

    /// Snapshot of the nodes and edges currently in the dirty set, for the
    /// Session Orchestrator's persistence path: it writes exactly these,
    /// then calls [`Self::mark_persisted`].
    pub fn dirty_snapshot(&self) -> (Vec<Node>, Vec<Edge>) {
        let guard = self.inner.lock();
        let nodes = guard
            .dirty
            .nodes
            .iter()
            .filter_map(|id| guard.state.nodes.get(id).cloned())
            .collect();
        let edges = guard
            .dirty
            .edges
            .iter()
            .filter_map(|key| guard.state.edges.get(key).cloned())
            .collect();
        (nodes, edges)
    }

    pub fn stats(&self) -> GraphStats {
        let guard = self.inner.lock();
        GraphStats {
            node_count: guard.state.nodes.len(),
            edge_count: guard.state.edges.len(),
            version: guard.state.version,
            dirty_count: guard.dirty.nodes.len() + guard.dirty.edges.len(),
        }
    }

    /// Serialize the current graph as a full Format E snapshot.
    pub fn serialize(&self, view_context: Option<&str>) -> String {
        let guard = self.inner.lock();
        let nodes: Vec<SnapshotNode> = guard
            .state
            .nodes
            .values()
            .map(|n| SnapshotNode {
                semantic_id: &n.semantic_id,
                description: &n.description,
                attributes: &n.attributes,
            })
            .collect();
        let edges: Vec<SnapshotEdge> = guard
            .state
            .edges
            .values()
            .map(|e| SnapshotEdge {
                source_id: &e.source_id,
                edge_type: e.edge_type,
                target_id: &e.target_id,
            })
            .collect();
        serialize_graph(nodes, edges, view_context)
    }

    // ---- subscriptions ----

    /// Register a handler invoked synchronously, in registration order,
    /// after every successful write. A handler that panics or whose
    /// enclosing call returns an error is logged and skipped; it never
    /// aborts the writer.
    pub fn on_graph_change<F>(&self, handler: F)
    where
        F: Fn(&GraphChangeEvent) + Send + Sync + 'static,
    {
        self.inner.lock().subscribers.push(Arc::new(handler));
    }

    // ---- writes ----

    pub fn set_node(&self, node: Node, upsert: bool) -> Result<()> {
        let mut guard = self.inner.lock();
        let existed = guard.state.nodes.contains_key(&node.semantic_id);
        if existed && !upsert {
            return Err(GraphStoreError::DuplicateSemanticId(node.semantic_id));
        }
        let semantic_id = node.semantic_id.clone();
        guard.state.nodes.insert(semantic_id.clone(), node);
        guard.state.version += 1;
        let version = guard.state.version;
        guard.dirty.nodes.insert(semantic_id.clone());

        emit(
            &guard.subscribers,
            GraphChangeEvent {
                kind: if existed { ChangeKind::Update } else { ChangeKind::Add },
                node_id: Some(semantic_id),
                edge_key: None,
                version,
            },
        );
        Ok(())
    }

    pub fn delete_node(&self, semantic_id: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.state.nodes.remove(semantic_id).is_none() {
            return Err(GraphStoreError::NodeNotFound(semantic_id.to_string()));
        }
        guard.state.version += 1;
        let version = guard.state.version;
        guard.dirty.nodes.insert(semantic_id.to_string());

        emit(
            &guard.subscribers,
            GraphChangeEvent {
                kind: ChangeKind::Remove,
                node_id: Some(semantic_id.to_string()),
                edge_key: None,
                version,
            },
        );
        Ok(())
    }

    pub fn set_edge(&self, edge: Edge, upsert: bool) -> Result<()> {
        let mut guard = self.inner.lock();
        let key = edge.key();
        let ord: EdgeKeyOrd = (&key).into();
        let existed = guard.state.edges.contains_key(&ord);
        if existed && !upsert {
            return Err(GraphStoreError::DuplicateEdge(key.0, key.1, key.2));
        }
        if existed {
            let old = guard.state.edges.get(&ord).cloned().unwrap();
            guard.index.remove(&old, &ord);
        }
        guard.index.insert(&edge, ord.clone());
        guard.state.edges.insert(ord.clone(), edge);
        guard.state.version += 1;
        let version = guard.state.version;
        guard.dirty.edges.insert(ord);

        emit(
            &guard.subscribers,
            GraphChangeEvent {
                kind: if existed { ChangeKind::Update } else { ChangeKind::Add },
                node_id: None,
                edge_key: Some(key),
                version,
            },
        );
        Ok(())
    }

    pub fn delete_edge(&self, uuid: uuid::Uuid) -> Result<()> {
        let mut guard = self.inner.lock();
        let found = guard
            .state
            .edges
            .iter()
            .find(|(_, e)| e.uuid == uuid)
            .map(|(k, e)| (k.clone(), e.clone()));
        let (ord, edge) = found.ok_or(GraphStoreError::EdgeNotFoundByUuid(uuid))?;

        guard.state.edges.remove(&ord);
        guard.index.remove(&edge, &ord);
        guard.state.version += 1;
        let version = guard.state.version;
        guard.dirty.edges.insert(ord.clone());

        emit(
            &guard.subscribers,
            GraphChangeEvent {
                kind: ChangeKind::Remove,
                node_id: None,
                edge_key: Some(edge.key()),
                version,
            },
        );
        Ok(())
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        guard.state = GraphState::default();
        guard.index = AdjacencyIndex::default();
        guard.dirty.clear();
    }

    pub fn load_from_state(&self, state: GraphState) {
        let mut guard = self.inner.lock();
        guard.index = AdjacencyIndex::rebuild(&state.edges);
        guard.state = state;
        guard.dirty.clear();
    }

    /// Record that `version` has been durably persisted, clearing the dirty
    /// set. Called by the Session Orchestrator after a successful save, not
    /// by the store itself — the store has no autosave timer.
    pub fn mark_persisted(&self, version: u64) {
        let mut guard = self.inner.lock();
        guard.state.last_saved_version = version;
        guard.dirty.clear();
    }

    /// Apply a parsed Format E diff atomically: node operations first, then
    /// edge operations, in the order they appeared in the source text. All
    /// operations are validated against a scratch copy of the state before
    /// anything is committed, so a failure partway through the diff leaves
    /// the store untouched.
    pub fn apply_diff(&self, diff: &FormatEDiff) -> Result<()> {
        let mut guard = self.inner.lock();
        let mut scratch = guard.state.clone();
        for op in &diff.node_ops {
            apply_node_op_to(&mut scratch, op)?;
        }
        for op in &diff.edge_ops {
            apply_edge_op_to(&mut scratch, op)?;
        }

        // Validated: replay onto the live state so indices and events stay
        // in lock-step with each individual mutation.
        for op in &diff.node_ops {
            commit_node_op(&mut guard, op);
        }
        for op in &diff.edge_ops {
            commit_edge_op(&mut guard, op);
        }
        Ok(())
    }

    /// Parse and apply a raw Format E `<operations>` block in one call.
    pub fn apply_diff_text(&self, text: &str) -> std::result::Result<(), ApplyError> {
        let diff = parse_diff(text).map_err(ApplyError::Parse)?;
        self.apply_diff(&diff).map_err(ApplyError::Store)?;
        Ok(())
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Either stage of [`GraphStore::apply_diff_text`] can fail independently;
/// callers (the Session Orchestrator) report the two kinds differently.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Parse(#[from] format_e::FormatEError),
    #[error(transparent)]
    Store(#[from] GraphStoreError),
}

fn emit(subscribers: &[Subscriber], event: GraphChangeEvent) {
    for subscriber in subscribers {
        let handler = subscriber.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
        if result.is_err() {
            tracing::warn!(version = event.version, "graph-change subscriber panicked");
        }
    }
}

fn apply_node_op_to(state: &mut GraphState, op: &NodeOp) -> Result<()> {
    match op {
        NodeOp::Add { semantic_id, .. } => {
            if state.nodes.contains_key(semantic_id) {
                return Err(GraphStoreError::DuplicateSemanticId(semantic_id.clone()));
            }
        }
        NodeOp::Update { semantic_id, .. } | NodeOp::Remove { semantic_id } => {
            if !state.nodes.contains_key(semantic_id) {
                return Err(GraphStoreError::NodeNotFound(semantic_id.clone()));
            }
        }
    }
    mutate_scratch_node(state, op);
    Ok(())
}

fn mutate_scratch_node(state: &mut GraphState, op: &NodeOp) {
    match op {
        NodeOp::Add {
            semantic_id,
            node_type,
            description,
            attributes,
        } => {
            let node = Node::new(semantic_id.clone(), *node_type, description.clone(), attributes.clone());
            state.nodes.insert(semantic_id.clone(), node);
        }
        NodeOp::Update {
            semantic_id,
            description,
            attributes,
        } => {
            if let Some(node) = state.nodes.get_mut(semantic_id) {
                node.merge(description.as_deref(), attributes);
            }
        }
        NodeOp::Remove { semantic_id } => {
            state.nodes.remove(semantic_id);
        }
    }
}

fn apply_edge_op_to(state: &mut GraphState, op: &EdgeOp) -> Result<()> {
    match op {
        EdgeOp::Add {
            source_id,
            edge_type,
            target_id,
        } => {
            if !state.nodes.contains_key(source_id) {
                return Err(GraphStoreError::NodeNotFound(source_id.clone()));
            }
            if !state.nodes.contains_key(target_id) {
                return Err(GraphStoreError::NodeNotFound(target_id.clone()));
            }
            let ord = EdgeKeyOrd(source_id.clone(), edge_type.arrow().to_string(), target_id.clone());
            if state.edges.contains_key(&ord) {
                return Err(GraphStoreError::DuplicateEdge(
                    source_id.clone(),
                    *edge_type,
                    target_id.clone(),
                ));
            }
            state.edges.insert(ord, Edge::new(source_id.clone(), *edge_type, target_id.clone()));
        }
        EdgeOp::Remove {
            source_id,
            edge_type,
            target_id,
        } => {
            let ord = EdgeKeyOrd(source_id.clone(), edge_type.arrow().to_string(), target_id.clone());
            if state.edges.remove(&ord).is_none() {
                return Err(GraphStoreError::EdgeNotFound(
                    source_id.clone(),
                    *edge_type,
                    target_id.clone(),
                ));
            }
        }
    }
    Ok(())
}

fn commit_node_op(inner: &mut Inner, op: &NodeOp) {
    match op {
        NodeOp::Add {
            semantic_id,
            node_type,
            description,
            attributes,
        } => {
            let node = Node::new(semantic_id.clone(), *node_type, description.clone(), attributes.clone());
            inner.state.nodes.insert(semantic_id.clone(), node);
            inner.state.version += 1;
            inner.dirty.nodes.insert(semantic_id.clone());
            emit(
                &inner.subscribers,
                GraphChangeEvent {
                    kind: ChangeKind::Add,
                    node_id: Some(semantic_id.clone()),
                    edge_key: None,
                    version: inner.state.version,
                },
            );
        }
        NodeOp::Update {
            semantic_id,
            description,
            attributes,
        } => {
            if let Some(node) = inner.state.nodes.get_mut(semantic_id) {
                node.merge(description.as_deref(), attributes);
            }
            inner.state.version += 1;
            inner.dirty.nodes.insert(semantic_id.clone());
            emit(
                &inner.subscribers,
                GraphChangeEvent {
                    kind: ChangeKind::Update,
                    node_id: Some(semantic_id.clone()),
                    edge_key: None,
                    version: inner.state.version,
                },
            );
        }
        NodeOp::Remove { semantic_id } => {
            inner.state.nodes.remove(semantic_id);
            inner.state.version += 1;
            inner.dirty.nodes.insert(semantic_id.clone());
            emit(
                &inner.subscribers,
                GraphChangeEvent {
                    kind: ChangeKind::Remove,
                    node_id: Some(semantic_id.clone()),
                    edge_key: None,
                    version: inner.state.version,
                },
            );
        }
    }
}

fn commit_edge_op(inner: &mut Inner, op: &EdgeOp) {
    match op {
        EdgeOp::Add {
            source_id,
            edge_type,
            target_id,
        } => {
            let edge = Edge::new(source_id.clone(), *edge_type, target_id.clone());
            let ord: EdgeKeyOrd = (&edge.key()).into();
            inner.index.insert(&edge, ord.clone());
            inner.state.edges.insert(ord.clone(), edge.clone());
            inner.state.version += 1;
            inner.dirty.edges.insert(ord);
            emit(
                &inner.subscribers,
                GraphChangeEvent {
                    kind: ChangeKind::Add,
                    node_id: None,
                    edge_key: Some(edge.key()),
                    version: inner.state.version,
                },
            );
        }
        EdgeOp::Remove {
            source_id,
            edge_type,
            target_id,
        } => {
            let ord = EdgeKeyOrd(source_id.clone(), edge_type.arrow().to_string(), target_id.clone());
            if let Some(edge) = inner.state.edges.remove(&ord) {
                inner.index.remove(&edge, &ord);
            }
            inner.state.version += 1;
            inner.dirty.edges.insert(ord);
            emit(
                &inner.subscribers,
                GraphChangeEvent {
                    kind: ChangeKind::Remove,
                    node_id: None,
                    edge_key: Some((source_id.clone(), *edge_type, target_id.clone())),
                    version: inner.state.version,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_e::NodeType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_node_strict_rejects_duplicates() {
        let store = GraphStore::new();
        let node = Node::new("A.SYS.001", NodeType::Sys, "a system", Default::default());
        store.set_node(node.clone(), false).unwrap();
        let err = store.set_node(node, false).unwrap_err();
        assert_eq!(err, GraphStoreError::DuplicateSemanticId("A.SYS.001".to_string()));
    }

    #[test]
    fn set_node_upsert_replaces_and_bumps_version() {
        let store = GraphStore::new();
        let node = Node::new("A.SYS.001", NodeType::Sys, "v1", Default::default());
        store.set_node(node, false).unwrap();
        let v1 = store.get_version();

        let updated = Node::new("A.SYS.001", NodeType::Sys, "v2", Default::default());
        store.set_node(updated, true).unwrap();
        assert!(store.get_version() > v1);
        assert_eq!(store.get_node("A.SYS.001").unwrap().description, "v2");
    }

    #[test]
    fn adjacency_indices_track_edges() {
        let store = GraphStore::new();
        store
            .set_edge(Edge::new("A.SYS.001", format_e::EdgeType::Io, "B.SYS.002"), false)
            .unwrap();
        let out = store.get_edges_for("A.SYS.001", Direction::Out);
        assert_eq!(out.len(), 1);
        let incoming = store.get_edges_for("B.SYS.002", Direction::In);
        assert_eq!(incoming.len(), 1);
    }

    #[test]
    fn apply_diff_is_atomic_on_failure() {
        let store = GraphStore::new();
        let text = "## Nodes\n+ A.SYS.001|first\n## Edges\n+ A.SYS.001 -io-> Missing.SYS.999\n";
        let diff = parse_diff(text).unwrap();
        let err = store.apply_diff(&diff).unwrap_err();
        assert_eq!(err, GraphStoreError::NodeNotFound("Missing.SYS.999".to_string()));
        // Rolled back: neither the node nor the edge is visible, and the
        // version counter did not move.
        assert!(store.get_node("A.SYS.001").is_none());
        assert_eq!(store.get_version(), 0);
    }

    #[test]
    fn apply_diff_allows_edge_to_node_introduced_earlier_in_same_batch() {
        let store = GraphStore::new();
        let text = "## Nodes\n+ A.SYS.001|first\n+ B.SYS.002|second\n## Edges\n+ A.SYS.001 -io-> B.SYS.002\n";
        let diff = parse_diff(text).unwrap();
        store.apply_diff(&diff).unwrap();
        assert_eq!(store.get_edges_for("A.SYS.001", Direction::Out).len(), 1);
    }

    #[test]
    fn apply_diff_rejects_duplicate_within_batch() {
        let store = GraphStore::new();
        let text = "## Nodes\n+ A.SYS.001|first\n+ A.SYS.001|dup\n";
        let diff = parse_diff(text).unwrap();
        let err = store.apply_diff(&diff).unwrap_err();
        assert_eq!(err, GraphStoreError::DuplicateSemanticId("A.SYS.001".to_string()));
        assert!(store.get_node("A.SYS.001").is_none());
    }

    #[test]
    fn subscribers_fire_in_registration_order() {
        let store = GraphStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        store.on_graph_change(move |e| o1.lock().push((1, e.version)));
        let o2 = order.clone();
        store.on_graph_change(move |e| o2.lock().push((2, e.version)));

        store
            .set_node(Node::new("A.SYS.001", NodeType::Sys, "x", Default::default()), false)
            .unwrap();

        let log = order.lock();
        assert_eq!(log.as_slice(), &[(1, 1), (2, 1)]);
    }

    #[test]
    fn stats_reports_counts_and_dirty_size() {
        let store = GraphStore::new();
        store
            .set_node(Node::new("A.SYS.001", NodeType::Sys, "x", Default::default()), false)
            .unwrap();
        let stats = store.stats();
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.dirty_count, 1);

        store.mark_persisted(stats.version);
        assert_eq!(store.stats().dirty_count, 0);
    }

    #[test]
    fn dirty_snapshot_reports_changed_nodes_and_edges() {
        let store = GraphStore::new();
        store
            .set_node(Node::new("A.SYS.001", NodeType::Sys, "x", Default::default()), false)
            .unwrap();
        store
            .set_edge(Edge::new("A.SYS.001", format_e::EdgeType::Io, "A.SYS.001"), false)
            .unwrap();
        let (nodes, edges) = store.dirty_snapshot();
        assert_eq!(nodes.len(), 1);
        assert_eq!(edges.len(), 1);

        store.mark_persisted(store.get_version());
        let (nodes, edges) = store.dirty_snapshot();
        assert!(nodes.is_empty());
        assert!(edges.is_empty());
    }

    #[test]
    fn delete_missing_edge_errors() {
        let store = GraphStore::new();
        let err = store.delete_edge(uuid::Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, GraphStoreError::EdgeNotFoundByUuid(_)));
    }

    #[test]
    fn panicking_subscriber_does_not_abort_writer() {
        let store = GraphStore::new();
        let called = Arc::new(AtomicUsize::new(0));
        store.on_graph_change(|_| panic!("boom"));
        let c = called.clone();
        store.on_graph_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store
            .set_node(Node::new("A.SYS.001", NodeType::Sys, "x", Default::default()), false)
            .unwrap();
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }
}
