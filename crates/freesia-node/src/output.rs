use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OutputMap;

/// Alias fields present on every normalized output; all equal to the primary
/// value unless the handler supplied its own.
pub const ALIAS_FIELDS: [&str; 6] = ["output", "content", "text", "response", "value", "result"];

/// Primary-value candidates, in order, for handler returns without `output`.
const PRIMARY_FALLBACK: [&str; 5] = ["text", "content", "response", "result", "value"];

static NULL: Value = Value::Null;

/// Declared I/O type of an input node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoKind {
  Text,
  Image,
  Audio,
  File,
  #[serde(rename = "JSON", alias = "Json")]
  Json,
}

impl IoKind {
  /// Name of the type-specific output field.
  pub fn field_name(self) -> &'static str {
    match self {
      Self::Text => "text",
      Self::Image => "image",
      Self::Audio => "audio",
      Self::File => "file",
      Self::Json => "json",
    }
  }

  /// Case-insensitive parse from a params value like `"text"` or `"JSON"`.
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "text" => Some(Self::Text),
      "image" => Some(Self::Image),
      "audio" => Some(Self::Audio),
      "file" => Some(Self::File),
      "json" => Some(Self::Json),
      _ => None,
    }
  }
}

/// The canonical record produced for every executed node.
///
/// An ordered JSON object: primary value under `output`, the alias fields,
/// an optional type-specific field for input nodes, then metadata
/// (`type`, `node_name`) and any handler extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput(OutputMap);

impl NodeOutput {
  /// Coerce a raw handler return into a canonical record.
  ///
  /// Idempotent: normalizing an already-normal record leaves it unchanged.
  /// Handler-supplied fields are never overwritten.
  pub fn normalize(
    raw: Value,
    node_type: &str,
    node_name: &str,
    io_kind: Option<IoKind>,
  ) -> Self {
    let mut map = match raw {
      Value::Object(map) if map.contains_key("output") => map,
      Value::Object(mut map) => {
        let primary = PRIMARY_FALLBACK
          .iter()
          .find_map(|key| map.get(*key).cloned())
          .unwrap_or_else(|| Value::Object(map.clone()));
        map.insert("output".to_string(), primary);
        map
      }
      scalar => {
        let mut map = OutputMap::new();
        map.insert("output".to_string(), scalar);
        map
      }
    };

    let primary = map.get("output").cloned().unwrap_or(Value::Null);

    for alias in ALIAS_FIELDS {
      if !map.contains_key(alias) {
        map.insert(alias.to_string(), primary.clone());
      }
    }

    if let Some(kind) = io_kind {
      if !map.contains_key(kind.field_name()) {
        map.insert(kind.field_name().to_string(), primary.clone());
      }
    }

    if !map.contains_key("type") {
      map.insert("type".to_string(), Value::String(node_type.to_string()));
    }
    if !map.contains_key("node_name") {
      map.insert("node_name".to_string(), Value::String(node_name.to_string()));
    }

    Self(map)
  }

  /// The canonical result value.
  pub fn primary(&self) -> &Value {
    self.0.get("output").unwrap_or(&NULL)
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.0.get(field)
  }

  pub fn as_map(&self) -> &OutputMap {
    &self.0
  }

  pub fn into_value(self) -> Value {
    Value::Object(self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_scalar_return() {
    let out = NodeOutput::normalize(json!("hello"), "text_processor", "upper", None);

    assert_eq!(out.primary(), "hello");
    for alias in ALIAS_FIELDS {
      assert_eq!(out.get(alias).unwrap(), "hello");
    }
    assert_eq!(out.get("type").unwrap(), "text_processor");
    assert_eq!(out.get("node_name").unwrap(), "upper");
  }

  #[test]
  fn test_mapping_with_output_preserves_keys() {
    let out = NodeOutput::normalize(
      json!({"output": "a", "model": "gpt-4o", "usage": {"tokens": 12}}),
      "openai",
      "openai-0",
      None,
    );

    assert_eq!(out.primary(), "a");
    assert_eq!(out.get("model").unwrap(), "gpt-4o");
    assert_eq!(out.get("usage").unwrap(), &json!({"tokens": 12}));
    assert_eq!(out.get("text").unwrap(), "a");
  }

  #[test]
  fn test_mapping_without_output_picks_first_candidate() {
    let out = NodeOutput::normalize(
      json!({"response": "r", "value": "v"}),
      "openai",
      "openai-0",
      None,
    );

    // `response` precedes `value` in the candidate order.
    assert_eq!(out.primary(), "r");
    // Handler-supplied `value` is not overwritten.
    assert_eq!(out.get("value").unwrap(), "v");
    assert_eq!(out.get("content").unwrap(), "r");
  }

  #[test]
  fn test_mapping_with_no_candidate_uses_whole_mapping() {
    let out = NodeOutput::normalize(json!({"score": 7}), "custom", "n0", None);

    assert_eq!(out.primary(), &json!({"score": 7}));
    assert_eq!(out.get("score").unwrap(), 7);
  }

  #[test]
  fn test_input_node_gets_type_field() {
    let out = NodeOutput::normalize(json!("hi"), "input", "input_0", Some(IoKind::Text));
    assert_eq!(out.get("text").unwrap(), "hi");

    let out = NodeOutput::normalize(json!({"a": 1}), "input", "input_1", Some(IoKind::Json));
    assert_eq!(out.get("json").unwrap(), &json!({"a": 1}));
  }

  #[test]
  fn test_normalize_is_idempotent() {
    let once = NodeOutput::normalize(json!({"response": "r"}), "openai", "openai-0", None);
    let twice = NodeOutput::normalize(once.clone().into_value(), "openai", "openai-0", None);
    assert_eq!(once, twice);
  }

  #[test]
  fn test_io_kind_parse() {
    assert_eq!(IoKind::parse("JSON"), Some(IoKind::Json));
    assert_eq!(IoKind::parse("text"), Some(IoKind::Text));
    assert_eq!(IoKind::parse("unknown"), None);
  }
}
