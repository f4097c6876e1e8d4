use async_trait::async_trait;
use serde_json::Value;

use freesia_node::{NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::to_text;

/// Terminal node: shapes the run's user-facing result.
///
/// Returns the `output`/`template` param (already template-resolved) when
/// present, otherwise the single upstream value, otherwise the newline
/// concatenation of all upstream values.
pub struct OutputHandler;

#[async_trait]
impl NodeHandler for OutputHandler {
  async fn execute(
    &self,
    _ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    if let Some(template) = params.get("output").or_else(|| params.get("template")) {
      return Ok(template.clone());
    }

    let values = inputs.values_in_order();
    match values.as_slice() {
      [] => Ok(Value::String(String::new())),
      [single] => Ok((*single).clone()),
      many => Ok(Value::String(
        many.iter().map(|v| to_text(v)).collect::<Vec<_>>().join("\n"),
      )),
    }
  }
}
