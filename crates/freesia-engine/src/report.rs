use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use freesia_node::{NodeError, OutputMap};
use freesia_template::TemplateWarning;

/// Lifecycle state of a node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Pending,
  Ready,
  Running,
  Completed,
  Failed,
  Skipped,
}

impl NodeStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed | Self::Skipped)
  }
}

/// Terminal state of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Completed,
  Partial,
  Failed,
  Cancelled,
}

/// Wire form of a node failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
  pub kind: String,
  pub message: String,
}

impl From<&NodeError> for ErrorInfo {
  fn from(err: &NodeError) -> Self {
    Self {
      kind: err.kind().to_string(),
      message: err.to_string(),
    }
  }
}

/// Per-node record in the final report.
#[derive(Debug, Clone, Serialize)]
pub struct NodeResultEntry {
  pub status: NodeStatus,
  pub execution_time: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorInfo>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<TemplateWarning>,
}

impl NodeResultEntry {
  pub(crate) fn pending() -> Self {
    Self {
      status: NodeStatus::Pending,
      execution_time: 0.0,
      skip_reason: None,
      error: None,
      warnings: Vec::new(),
    }
  }
}

/// The final run report.
#[derive(Debug, Serialize)]
pub struct RunReport {
  pub run_id: String,
  pub status: RunStatus,
  /// Output table: node id to normalized output record.
  pub outputs: OutputMap,
  pub node_results: HashMap<String, NodeResultEntry>,
  /// Node ids in completion order.
  pub execution_path: Vec<String>,
  /// Wall-clock duration of the run in seconds.
  pub execution_time: f64,
}

impl RunReport {
  /// A node's output record.
  pub fn output(&self, node_id: &str) -> Option<&Value> {
    self.outputs.get(node_id)
  }

  /// A field of a node's output record.
  pub fn output_field(&self, node_id: &str, field: &str) -> Option<&Value> {
    self.outputs.get(node_id)?.get(field)
  }

  pub fn node_result(&self, node_id: &str) -> Option<&NodeResultEntry> {
    self.node_results.get(node_id)
  }

  pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
    self.node_results.get(node_id).map(|entry| entry.status)
  }
}

/// Mid-run view of a live run, served by `Engine::status`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
  pub run_id: String,
  pub statuses: HashMap<String, NodeStatus>,
}
