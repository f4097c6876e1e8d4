use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use freesia_node::{NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::{i64_param, str_param, to_text};

/// Pure string transforms selected by the `operation` param.
///
/// The source text comes from the `text` param (already template-resolved)
/// or the primary upstream value. Without an `operation`, the node acts as a
/// template: it returns the source text unchanged.
pub struct TextProcessorHandler;

#[async_trait]
impl NodeHandler for TextProcessorHandler {
  async fn execute(
    &self,
    _ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    let text = str_param(params, "text")
      .map(str::to_string)
      .or_else(|| inputs.primary().map(to_text))
      .unwrap_or_default();

    let operation = str_param(params, "operation").unwrap_or("template");

    let result = match operation {
      "template" => Value::String(text),
      "uppercase" => Value::String(text.to_uppercase()),
      "lowercase" => Value::String(text.to_lowercase()),
      "capitalize" => Value::String(capitalize(&text)),
      "trim" => Value::String(text.trim().to_string()),
      "length" => Value::from(text.chars().count() as u64),
      "replace" => {
        let pattern = str_param(params, "pattern").unwrap_or_default();
        let replacement = str_param(params, "replacement").unwrap_or_default();
        Value::String(text.replace(pattern, replacement))
      }
      "regex_replace" => {
        let pattern = str_param(params, "pattern").unwrap_or_default();
        let replacement = str_param(params, "replacement").unwrap_or_default();
        let re = Regex::new(pattern)
          .map_err(|e| NodeError::handler("parse", format!("invalid pattern: {}", e)))?;
        Value::String(re.replace_all(&text, replacement).into_owned())
      }
      "split" => {
        let delimiter = str_param(params, "delimiter").unwrap_or(",");
        Value::Array(
          text
            .split(delimiter)
            .map(|part| Value::String(part.to_string()))
            .collect(),
        )
      }
      "join" => {
        let delimiter = str_param(params, "delimiter").unwrap_or(",");
        let parts: Vec<String> = match inputs.primary() {
          Some(Value::Array(items)) => items.iter().map(to_text).collect(),
          _ => inputs.values_in_order().into_iter().map(to_text).collect(),
        };
        Value::String(parts.join(delimiter))
      }
      "substring" => {
        let start = i64_param(params, "start").unwrap_or(0).max(0) as usize;
        let chars: Vec<char> = text.chars().collect();
        let end = i64_param(params, "end")
          .map(|e| (e.max(0) as usize).min(chars.len()))
          .unwrap_or(chars.len());
        let start = start.min(end);
        Value::String(chars[start..end].iter().collect())
      }
      other => {
        return Err(NodeError::handler(
          "parse",
          format!("unknown text operation '{}'", other),
        ));
      }
    };

    Ok(result)
  }
}

fn capitalize(text: &str) -> String {
  let mut chars = text.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
