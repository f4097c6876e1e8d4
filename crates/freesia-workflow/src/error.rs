use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("duplicate node id: {node_id}")]
  DuplicateNodeId { node_id: String },

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("workflow graph contains a cycle")]
  CycleDetected,
}
