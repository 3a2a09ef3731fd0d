use serde_json::json;

use crate::error::GraphError;
use crate::graph::{Graph, NodeSpec};

fn chain() -> Graph {
  let mut graph = Graph::new("chain");
  graph.add_node("a", NodeSpec::new("first")).unwrap();
  graph.add_node("b", NodeSpec::new("second")).unwrap();
  graph.add_node("c", NodeSpec::new("third")).unwrap();
  graph.add_edge("a", "b").unwrap();
  graph.add_edge("b", "c").unwrap();
  graph.add_root("a").unwrap();
  graph
}

#[test]
fn test_duplicate_node_fails() {
  let mut graph = Graph::new("g");
  graph.add_node("a", NodeSpec::new("first")).unwrap();
  let err = graph.add_node("a", NodeSpec::new("other")).unwrap_err();
  assert!(matches!(err, GraphError::DuplicateNode(id) if id == "a"));
}

#[test]
fn test_edges_and_roots_must_reference_nodes() {
  let mut graph = Graph::new("g");
  graph.add_node("a", NodeSpec::new("first")).unwrap();

  assert!(matches!(
    graph.add_edge("a", "ghost"),
    Err(GraphError::UnknownNode(id)) if id == "ghost"
  ));
  assert!(matches!(
    graph.add_edge("ghost", "a"),
    Err(GraphError::UnknownNode(_))
  ));
  assert!(matches!(
    graph.add_root("ghost"),
    Err(GraphError::UnknownNode(_))
  ));
}

#[test]
fn test_children() {
  let graph = chain();
  let children: Vec<&String> = graph.children("a").collect();
  assert_eq!(children, vec!["b"]);
  assert_eq!(graph.children("c").count(), 0);
}

#[test]
fn test_reroot_shares_structure() {
  let graph = chain();
  let view = graph.reroot("b").unwrap();

  assert_eq!(view.roots().len(), 1);
  assert!(view.roots().contains("b"));
  // Shared tables: the full topology stays visible through the view.
  assert!(view.node("a").is_some());
  assert_eq!(view.children("b").collect::<Vec<_>>(), vec!["c"]);
  // The original is untouched.
  assert!(graph.roots().contains("a"));
}

#[test]
fn test_reroot_unknown_node_fails() {
  let graph = chain();
  assert!(matches!(
    graph.reroot("ghost"),
    Err(GraphError::UnknownNode(_))
  ));
}

#[test]
fn test_graph_wire_roundtrip() {
  let mut graph = Graph::new("g");
  graph
    .add_node(
      "a",
      NodeSpec::new("first").with_args(vec![json!(1)]),
    )
    .unwrap();
  graph.add_node("b", NodeSpec::new("second")).unwrap();
  graph.add_edge("a", "b").unwrap();
  graph.add_root("a").unwrap();

  let wire = serde_json::to_string(&graph).unwrap();
  let decoded: Graph = serde_json::from_str(&wire).unwrap();

  assert_eq!(decoded.id, "g");
  assert_eq!(decoded.node("a").unwrap().args, vec![json!(1)]);
  assert_eq!(decoded.children("a").collect::<Vec<_>>(), vec!["b"]);
  assert!(decoded.roots().contains("a"));
}
