use async_trait::async_trait;
use serde_json::Value;

use freesia_node::{IoKind, NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::{str_param, to_text};

/// Entry-point node: surfaces a runtime input value.
///
/// The input assembler binds the matching run input (by `input`,
/// `input_<n>`, node name, or raw id) under the `input` handle and the
/// resolved I/O type under `input_type`; `value`/`default` params act as a
/// fallback when the run supplied nothing.
pub struct InputHandler;

#[async_trait]
impl NodeHandler for InputHandler {
  async fn execute(
    &self,
    ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    let raw = inputs
      .get("input")
      .or_else(|| params.get("value"))
      .or_else(|| params.get("default"))
      .cloned()
      .ok_or_else(|| NodeError::MissingInput {
        message: format!("no run input matched input node '{}'", ctx.node_id),
      })?;

    let kind = inputs
      .get("input_type")
      .and_then(Value::as_str)
      .or_else(|| str_param(params, "input_type"))
      .and_then(IoKind::parse)
      .unwrap_or(IoKind::Text);

    let coerced = coerce(raw.clone(), kind);
    if coerced != raw {
      let mut out = OutputMap::new();
      out.insert("output".to_string(), coerced);
      out.insert("input_raw".to_string(), raw);
      return Ok(Value::Object(out));
    }
    Ok(coerced)
  }
}

/// Shape a raw run input to its declared I/O type.
fn coerce(raw: Value, kind: IoKind) -> Value {
  match kind {
    IoKind::Text => match raw {
      Value::String(_) => raw,
      other => Value::String(to_text(&other)),
    },
    IoKind::Json => match raw {
      Value::String(ref s) => serde_json::from_str(s).unwrap_or(raw),
      other => other,
    },
    // References (image/audio/file) pass through untouched.
    _ => raw,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::Arc;
  use tokio_util::sync::CancellationToken;

  fn ctx(node_id: &str) -> NodeContext {
    NodeContext {
      run_id: "run".to_string(),
      node_id: node_id.to_string(),
      node_name: node_id.to_string(),
      outputs: Arc::new(OutputMap::new()),
      cancel: CancellationToken::new(),
    }
  }

  #[tokio::test]
  async fn test_run_input_passes_through() {
    let mut inputs = NodeInputs::new();
    inputs.insert("input", json!("what is 2+2?"));

    let result = InputHandler
      .execute(&ctx("input_0"), &OutputMap::new(), &inputs)
      .await
      .unwrap();
    assert_eq!(result, "what is 2+2?");
  }

  #[tokio::test]
  async fn test_value_param_fallback() {
    let mut params = OutputMap::new();
    params.insert("value".to_string(), json!("default text"));

    let result = InputHandler
      .execute(&ctx("input_0"), &params, &NodeInputs::new())
      .await
      .unwrap();
    assert_eq!(result, "default text");
  }

  #[tokio::test]
  async fn test_missing_input_fails() {
    let result = InputHandler
      .execute(&ctx("input_0"), &OutputMap::new(), &NodeInputs::new())
      .await;
    assert!(matches!(result, Err(NodeError::MissingInput { .. })));
  }

  #[tokio::test]
  async fn test_text_coercion_keeps_raw() {
    let mut inputs = NodeInputs::new();
    inputs.insert("input", json!(42));
    inputs.insert("input_type", json!("text"));

    let result = InputHandler
      .execute(&ctx("input_0"), &OutputMap::new(), &inputs)
      .await
      .unwrap();
    assert_eq!(result["output"], "42");
    assert_eq!(result["input_raw"], 42);
  }

  #[tokio::test]
  async fn test_json_input_parses_strings() {
    let mut inputs = NodeInputs::new();
    inputs.insert("input", json!(r#"{"a": 1}"#));
    inputs.insert("input_type", json!("JSON"));

    let result = InputHandler
      .execute(&ctx("input_1"), &OutputMap::new(), &inputs)
      .await
      .unwrap();
    assert_eq!(result["output"], json!({"a": 1}));
  }
}
