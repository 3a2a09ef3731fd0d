//! Immutable DAG of task nodes used to chain task outputs into subsequent
//! tasks' inputs.
//!
//! A graph is pure data: node id to [`NodeSpec`], edges as id to child-id
//! sets, and a root set naming the nodes to execute now. The one operation
//! beyond construction is [`Graph::reroot`], which produces a view of exactly
//! one pending step: the node and edge tables are `Arc`-shared, only the root
//! set changes. Each propagation hop sends such a single-root view and
//! discards the previous one.
//!
//! Construction enforces the structural invariant that every id referenced by
//! an edge or a root exists in the node table. Cycles are not detected; a
//! cyclic graph re-submits its members indefinitely.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GraphError;
use crate::task::TaskOptionOverrides;

/// One graph node: a task name plus the stored call parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
  /// Name of the task to submit for this node.
  pub task_name: String,
  /// Stored positional arguments; caller arguments are appended at fan-out.
  pub args: Vec<Value>,
  /// Stored keyword arguments; caller entries win on key conflicts.
  pub kwds: HashMap<String, Value>,
  /// Option overrides applied when this node is sent.
  pub options: TaskOptionOverrides,
}

impl NodeSpec {
  /// Creates a node spec for `task_name` with no stored parameters.
  #[must_use]
  pub fn new(task_name: impl Into<String>) -> Self {
    Self {
      task_name: task_name.into(),
      args: Vec::new(),
      kwds: HashMap::new(),
      options: TaskOptionOverrides::default(),
    }
  }

  /// Sets the stored positional arguments.
  #[must_use]
  pub fn with_args(mut self, args: Vec<Value>) -> Self {
    self.args = args;
    self
  }

  /// Sets the stored keyword arguments.
  #[must_use]
  pub fn with_kwds(mut self, kwds: HashMap<String, Value>) -> Self {
    self.kwds = kwds;
    self
  }

  /// Sets the option overrides for this node.
  #[must_use]
  pub fn with_options(mut self, options: TaskOptionOverrides) -> Self {
    self.options = options;
    self
  }
}

/// An immutable DAG of task nodes, edges and a current root set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
  /// Graph id, stable across re-rooted views.
  pub id: String,
  nodes: Arc<HashMap<String, NodeSpec>>,
  edges: Arc<HashMap<String, BTreeSet<String>>>,
  roots: BTreeSet<String>,
}

impl Graph {
  /// Creates an empty graph.
  #[must_use]
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      nodes: Arc::new(HashMap::new()),
      edges: Arc::new(HashMap::new()),
      roots: BTreeSet::new(),
    }
  }

  /// Adds a node. Fails if `id` was already added.
  pub fn add_node(&mut self, id: impl Into<String>, spec: NodeSpec) -> Result<(), GraphError> {
    let id = id.into();
    let nodes = Arc::make_mut(&mut self.nodes);
    if nodes.contains_key(&id) {
      return Err(GraphError::DuplicateNode(id));
    }
    nodes.insert(id, spec);
    Ok(())
  }

  /// Adds a parent to child edge. Both ids must exist in the node table.
  pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<(), GraphError> {
    if !self.nodes.contains_key(parent) {
      return Err(GraphError::UnknownNode(parent.to_string()));
    }
    if !self.nodes.contains_key(child) {
      return Err(GraphError::UnknownNode(child.to_string()));
    }
    Arc::make_mut(&mut self.edges)
      .entry(parent.to_string())
      .or_default()
      .insert(child.to_string());
    Ok(())
  }

  /// Marks a node for execution on the first hop. The id must exist in the
  /// node table.
  pub fn add_root(&mut self, id: &str) -> Result<(), GraphError> {
    if !self.nodes.contains_key(id) {
      return Err(GraphError::UnknownNode(id.to_string()));
    }
    self.roots.insert(id.to_string());
    Ok(())
  }

  /// Produces a view of this graph with `roots = {child}`, sharing the node
  /// and edge tables.
  pub fn reroot(&self, child: &str) -> Result<Graph, GraphError> {
    if !self.nodes.contains_key(child) {
      return Err(GraphError::UnknownNode(child.to_string()));
    }
    let mut roots = BTreeSet::new();
    roots.insert(child.to_string());
    Ok(Graph {
      id: self.id.clone(),
      nodes: Arc::clone(&self.nodes),
      edges: Arc::clone(&self.edges),
      roots,
    })
  }

  /// The node spec for `id`, if present.
  #[must_use]
  pub fn node(&self, id: &str) -> Option<&NodeSpec> {
    self.nodes.get(id)
  }

  /// The current root set.
  #[must_use]
  pub fn roots(&self) -> &BTreeSet<String> {
    &self.roots
  }

  /// Children of `id`, empty when the node has no outgoing edges.
  pub fn children<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a String> + 'a {
    self.edges.get(id).into_iter().flatten()
  }
}

impl fmt::Display for Graph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Graph[{} nodes={} roots={:?}]",
      self.id,
      self.nodes.len(),
      self.roots
    )
  }
}
