use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::OutputMap;

/// Per-node execution context.
///
/// The output table is a read-only snapshot taken when the node was
/// dispatched; handlers communicate only through their returned value, never
/// by writing to the table. Cancellation is cooperative: long-running
/// handlers should poll or select on `cancel`.
#[derive(Debug, Clone)]
pub struct NodeContext {
  pub run_id: String,
  pub node_id: String,
  pub node_name: String,
  pub outputs: Arc<OutputMap>,
  pub cancel: CancellationToken,
}

impl NodeContext {
  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }
}
