use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WorkflowError;
use crate::graph::Graph;

/// A workflow document: nodes plus directed edges.
///
/// This mirrors the authoring format:
///
/// ```json
/// {
///   "nodes": [{"id": "input_0", "type": "input", "data": {"params": {}}}],
///   "edges": [{"source": "input_0", "target": "output-0"}]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

impl WorkflowDef {
  /// Validate structure: unique node ids and edges that reference known nodes.
  ///
  /// Cycle detection happens in [`Graph::topological_order`]; both are
  /// checked before any node executes.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    let mut seen = HashSet::new();
    for node in &self.nodes {
      if !seen.insert(node.id.as_str()) {
        return Err(WorkflowError::DuplicateNodeId {
          node_id: node.id.clone(),
        });
      }
    }

    for edge in &self.edges {
      if !seen.contains(edge.source.as_str()) || !seen.contains(edge.target.as_str()) {
        return Err(WorkflowError::InvalidEdge {
          from: edge.source.clone(),
          to: edge.target.clone(),
        });
      }
    }

    Ok(())
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(self)
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.id == node_id)
  }
}

/// A single node in the workflow document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  /// Type tag, e.g. `input`, `condition`, `openai`, `github`.
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default)]
  pub data: NodeData,
}

impl NodeDef {
  /// The node's parameter mapping.
  pub fn params(&self) -> &Map<String, Value> {
    &self.data.params
  }

  /// Human-facing alias, falling back to the node id.
  pub fn node_name(&self) -> &str {
    self
      .data
      .params
      .get("node_name")
      .and_then(Value::as_str)
      .unwrap_or(&self.id)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
  #[serde(default)]
  pub params: Map<String, Value>,
}

/// A directed edge. Handles are optional: `source_handle` names the output
/// branch on the source (condition paths), `target_handle` the input slot on
/// the target (merge inputs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub source: String,
  pub target: String,
  #[serde(default, alias = "sourceHandle", skip_serializing_if = "Option::is_none")]
  pub source_handle: Option<String>,
  #[serde(default, alias = "targetHandle", skip_serializing_if = "Option::is_none")]
  pub target_handle: Option<String>,
}
