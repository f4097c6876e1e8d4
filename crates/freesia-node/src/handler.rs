use async_trait::async_trait;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::inputs::NodeInputs;
use crate::OutputMap;

/// Timeout class of a handler.
///
/// Built-ins run without a deadline; AI and integration handlers get
/// per-kind default deadlines from the engine options, and only built-ins
/// count against the CPU-bound concurrency cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
  Builtin,
  Ai,
  Integration,
}

/// The uniform execution contract for all node kinds.
///
/// `params` arrive with every contained string already template-resolved;
/// handlers must not re-interpret `{{...}}`. The returned value may be any
/// JSON shape acceptable to the output normalizer.
#[async_trait]
pub trait NodeHandler: Send + Sync {
  fn kind(&self) -> HandlerKind {
    HandlerKind::Builtin
  }

  async fn execute(
    &self,
    ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError>;
}
