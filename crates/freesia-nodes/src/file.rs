use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;

use freesia_node::{NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::{str_param, to_text};

/// Encoding transforms over file-ish content.
///
/// Operates on the `content` param or the primary upstream value as text.
pub struct FileTransformerHandler;

#[async_trait]
impl NodeHandler for FileTransformerHandler {
  async fn execute(
    &self,
    _ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    let content = str_param(params, "content")
      .map(str::to_string)
      .or_else(|| inputs.primary().map(to_text))
      .unwrap_or_default();

    let operation = str_param(params, "operation").unwrap_or("base64_encode");

    let result = match operation {
      "base64_encode" => Value::String(STANDARD.encode(content.as_bytes())),
      "base64_decode" => {
        let bytes = STANDARD
          .decode(content.trim())
          .map_err(|e| NodeError::handler("parse", format!("invalid base64: {}", e)))?;
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
      }
      "hex_encode" => Value::String(hex::encode(content.as_bytes())),
      "hex_decode" => {
        let bytes = hex::decode(content.trim())
          .map_err(|e| NodeError::handler("parse", format!("invalid hex: {}", e)))?;
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
      }
      "lines" => Value::Array(
        content
          .lines()
          .map(|line| Value::String(line.to_string()))
          .collect(),
      ),
      "byte_length" => Value::from(content.len() as u64),
      other => {
        return Err(NodeError::handler(
          "parse",
          format!("unknown file operation '{}'", other),
        ));
      }
    };

    Ok(result)
  }
}
