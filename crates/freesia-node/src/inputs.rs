use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::output::IoKind;
use crate::OutputMap;

/// Runtime inputs supplied to a run.
///
/// Each entry is either a bare value or a typed envelope:
/// `{"value": ..., "type": "Text|Image|Audio|File|JSON"}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunInputs(OutputMap);

impl RunInputs {
  pub fn new(map: OutputMap) -> Self {
    Self(map)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Look up a key, unwrapping the typed envelope if present.
  pub fn get(&self, key: &str) -> Option<(&Value, Option<IoKind>)> {
    let raw = self.0.get(key)?;
    if let Value::Object(map) = raw {
      if let (Some(value), Some(kind)) = (map.get("value"), map.get("type")) {
        let kind = kind.as_str().and_then(IoKind::parse);
        return Some((value, kind));
      }
    }
    Some((raw, None))
  }
}

/// The assembled input bundle handed to a handler.
///
/// One entry per target handle (unnamed handles group under `input`), in
/// edge declaration order. A handle fed by several edges is bound to a list;
/// such keys are tracked so list flattening never splits a value that was
/// itself an array.
#[derive(Debug, Clone, Default)]
pub struct NodeInputs {
  entries: OutputMap,
  multi: HashSet<String>,
}

impl NodeInputs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bind a handle to a single upstream value.
  pub fn insert(&mut self, handle: impl Into<String>, value: Value) {
    self.entries.insert(handle.into(), value);
  }

  /// Bind a handle to a list of upstream values in edge order.
  pub fn insert_many(&mut self, handle: impl Into<String>, values: Vec<Value>) {
    let handle = handle.into();
    self.multi.insert(handle.clone());
    self.entries.insert(handle, Value::Array(values));
  }

  pub fn get(&self, handle: &str) -> Option<&Value> {
    self.entries.get(handle)
  }

  /// The default input: the `input` handle, or the first bound handle.
  pub fn primary(&self) -> Option<&Value> {
    self
      .entries
      .get("input")
      .or_else(|| self.entries.values().next())
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Handle/value pairs in binding order.
  pub fn entries(&self) -> &OutputMap {
    &self.entries
  }

  /// All upstream values in binding order, with multi-edge lists expanded.
  pub fn values_in_order(&self) -> Vec<&Value> {
    let mut out = Vec::new();
    for (handle, value) in &self.entries {
      match value {
        Value::Array(items) if self.multi.contains(handle) => out.extend(items.iter()),
        other => out.push(other),
      }
    }
    out
  }

  /// Object view of the bundle, for dotted-path addressing.
  pub fn as_value(&self) -> Value {
    Value::Object(self.entries.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_run_inputs_envelope() {
    let inputs: RunInputs =
      serde_json::from_value(json!({
        "input": {"value": "hello", "type": "Text"},
        "count": 3
      }))
      .unwrap();

    let (value, kind) = inputs.get("input").unwrap();
    assert_eq!(value, "hello");
    assert_eq!(kind, Some(IoKind::Text));

    let (value, kind) = inputs.get("count").unwrap();
    assert_eq!(value, 3);
    assert_eq!(kind, None);
  }

  #[test]
  fn test_values_in_order_expands_only_multi_edges() {
    let mut inputs = NodeInputs::new();
    inputs.insert("a", json!([1, 2]));
    inputs.insert_many("b", vec![json!("x"), json!("y")]);

    let values = inputs.values_in_order();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0], &json!([1, 2]));
    assert_eq!(values[1], "x");
    assert_eq!(values[2], "y");
  }

  #[test]
  fn test_primary_prefers_input_handle() {
    let mut inputs = NodeInputs::new();
    inputs.insert("other", json!(1));
    inputs.insert("input", json!(2));
    assert_eq!(inputs.primary().unwrap(), 2);
  }
}
