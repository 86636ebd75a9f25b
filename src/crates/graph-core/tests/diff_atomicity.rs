//! End-to-end scenarios straight out of the testable-properties section:
//! create-and-link, duplicate rejection, a dangling edge within one diff,
//! and atomic rollback when a later operation in the same diff fails.

use format_e::{EdgeType, NodeType};
use graph_core::{Direction, GraphStore};

#[test]
fn create_and_link() {
    let store = GraphStore::new();
    let diff = "\
<operations>
## Nodes
+ Order.SYS.001|Order management
+ Checkout.UC.001|Handle checkout
## Edges
+ Order.SYS.001 -cp-> Checkout.UC.001
</operations>";

    store.apply_diff_text(diff).unwrap();

    assert_eq!(store.get_version(), 3);
    assert_eq!(store.get_node("Order.SYS.001").unwrap().node_type, NodeType::Sys);

    let out = store.get_edges_for("Order.SYS.001", Direction::Out);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].edge_type, EdgeType::Compose);
    assert_eq!(out[0].target_id, "Checkout.UC.001");
}

#[test]
fn duplicate_rejection() {
    let store = GraphStore::new();
    store.apply_diff_text("## Nodes\n+ Order.SYS.001|Order management\n").unwrap();
    let before = store.get_version();

    let err = store.apply_diff_text("## Nodes\n+ Order.SYS.001|Another\n").unwrap_err();
    assert!(matches!(err, graph_core::ApplyError::Store(graph_core::GraphStoreError::DuplicateSemanticId(ref id)) if id == "Order.SYS.001"));

    assert_eq!(store.get_version(), before);
    assert_eq!(store.get_node("Order.SYS.001").unwrap().description, "Order management");
}

#[test]
fn dangling_edge_in_same_diff_is_rejected_wholesale() {
    let store = GraphStore::new();
    let diff = "## Edges\n+ Missing.FUNC.001 -io-> Order.SYS.001\n";

    let err = store.apply_diff_text(diff).unwrap_err();
    assert!(matches!(
        err,
        graph_core::ApplyError::Store(graph_core::GraphStoreError::NodeNotFound(ref id)) if id == "Missing.FUNC.001"
    ));
    assert_eq!(store.get_version(), 0);
}

#[test]
fn atomic_rollback_on_a_later_duplicate_edge() {
    let store = GraphStore::new();
    store
        .apply_diff_text(
            "## Nodes\n+ A.SYS.001|a\n+ B.SYS.002|b\n## Edges\n+ A.SYS.001 -io-> B.SYS.002\n",
        )
        .unwrap();
    let before_version = store.get_version();
    let (dirty_nodes_before, dirty_edges_before) = store.dirty_snapshot();

    // First op (a new node) is valid; second op (the same edge again) is a
    // duplicate under strict mode. Nothing from this diff should land.
    let diff = "## Nodes\n+ C.SYS.003|c\n## Edges\n+ A.SYS.001 -io-> B.SYS.002\n";
    let err = store.apply_diff_text(diff).unwrap_err();
    assert!(matches!(err, graph_core::ApplyError::Store(graph_core::GraphStoreError::DuplicateEdge(..))));

    assert!(store.get_node("C.SYS.003").is_none());
    assert_eq!(store.get_version(), before_version);
    let (dirty_nodes_after, dirty_edges_after) = store.dirty_snapshot();
    assert_eq!(dirty_nodes_before.len(), dirty_nodes_after.len());
    assert_eq!(dirty_edges_before.len(), dirty_edges_after.len());
}

#[test]
fn snapshot_round_trip_rebuilds_an_equivalent_store() {
    let store = GraphStore::new();
    store
        .apply_diff_text(
            "## Nodes\n+ A.SYS.001|a [phase:1]\n+ B.UC.002|b\n## Edges\n+ A.SYS.001 -cp-> B.UC.002\n",
        )
        .unwrap();

    let snapshot_text = store.serialize(None);

    let rebuilt = GraphStore::new();
    rebuilt.apply_diff_text(&snapshot_text).unwrap();

    assert_eq!(rebuilt.get_all_nodes().len(), store.get_all_nodes().len());
    assert_eq!(rebuilt.get_all_edges().len(), store.get_all_edges().len());
    assert_eq!(
        rebuilt.get_node("A.SYS.001").unwrap().attributes.get("phase"),
        store.get_node("A.SYS.001").unwrap().attributes.get("phase"),
    );
}
