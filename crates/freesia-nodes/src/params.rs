//! Shared param accessors for built-in handlers.

use freesia_node::OutputMap;
use serde_json::Value;

pub(crate) fn str_param<'a>(params: &'a OutputMap, key: &str) -> Option<&'a str> {
  params.get(key).and_then(Value::as_str)
}

pub(crate) fn i64_param(params: &OutputMap, key: &str) -> Option<i64> {
  match params.get(key)? {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

pub(crate) fn bool_param(params: &OutputMap, key: &str) -> Option<bool> {
  match params.get(key)? {
    Value::Bool(b) => Some(*b),
    Value::String(s) => match s.to_ascii_lowercase().as_str() {
      "true" => Some(true),
      "false" => Some(false),
      _ => None,
    },
    _ => None,
  }
}

/// Textual form of a value: strings pass through, null is empty, structured
/// values render as canonical JSON. Matches the template resolver's coercion.
pub(crate) fn to_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    other => serde_json::to_string(other).unwrap_or_default(),
  }
}

/// Numeric view of a value, accepting numeric strings.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}
