use async_trait::async_trait;
use serde_json::{Map, Value, json};

use freesia_node::{NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::{bool_param, str_param};

/// Structured-data transforms selected by the `operation` param.
///
/// The source value comes from the `json` param or the primary upstream
/// value; dotted `path` params address into objects and arrays.
pub struct JsonHandler;

#[async_trait]
impl NodeHandler for JsonHandler {
  async fn execute(
    &self,
    _ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    let source = params
      .get("json")
      .cloned()
      .or_else(|| inputs.primary().cloned())
      .unwrap_or(Value::Null);

    let operation = str_param(params, "operation").unwrap_or("parse");

    let result = match operation {
      "parse" => parse(source)?,
      "stringify" => {
        let text = if bool_param(params, "pretty").unwrap_or(false) {
          serde_json::to_string_pretty(&source)
        } else {
          serde_json::to_string(&source)
        }
        .map_err(|e| NodeError::handler("parse", e.to_string()))?;
        Value::String(text)
      }
      "get" => {
        let path = str_param(params, "path").unwrap_or_default();
        get_path(&parse(source)?, path).cloned().unwrap_or(Value::Null)
      }
      "set" => {
        let path = str_param(params, "path").unwrap_or_default();
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        let mut target = parse(source)?;
        set_path(&mut target, path, value);
        target
      }
      "keys" => match parse(source)? {
        Value::Object(map) => Value::Array(map.keys().map(|k| json!(k)).collect()),
        other => {
          return Err(NodeError::handler(
            "parse",
            format!("keys requires an object, got {}", type_name(&other)),
          ));
        }
      },
      "values" => match parse(source)? {
        Value::Object(map) => Value::Array(map.into_iter().map(|(_, v)| v).collect()),
        other => {
          return Err(NodeError::handler(
            "parse",
            format!("values requires an object, got {}", type_name(&other)),
          ));
        }
      },
      "length" => match parse(source)? {
        Value::Object(map) => Value::from(map.len() as u64),
        Value::Array(items) => Value::from(items.len() as u64),
        Value::String(s) => Value::from(s.chars().count() as u64),
        other => {
          return Err(NodeError::handler(
            "parse",
            format!("length not defined for {}", type_name(&other)),
          ));
        }
      },
      "merge" => {
        let mut merged = Map::new();
        for value in inputs.values_in_order() {
          if let Value::Object(map) = value {
            for (key, value) in map {
              merged.insert(key.clone(), value.clone());
            }
          }
        }
        Value::Object(merged)
      }
      other => {
        return Err(NodeError::handler(
          "parse",
          format!("unknown json operation '{}'", other),
        ));
      }
    };

    Ok(result)
  }
}

/// Strings are parsed as JSON; anything else is already structured.
fn parse(source: Value) -> Result<Value, NodeError> {
  match source {
    Value::String(s) => serde_json::from_str(&s)
      .map_err(|e| NodeError::handler("parse", format!("invalid JSON: {}", e))),
    other => Ok(other),
  }
}

fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
  if path.is_empty() {
    return Some(value);
  }
  let mut current = value;
  for segment in path.split('.') {
    current = match current {
      Value::Object(map) => map.get(segment)?,
      Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }
  Some(current)
}

/// Set a dotted path, creating intermediate objects as needed.
fn set_path(target: &mut Value, path: &str, value: Value) {
  if path.is_empty() {
    *target = value;
    return;
  }

  let mut current = target;
  let segments: Vec<&str> = path.split('.').collect();
  for (i, segment) in segments.iter().enumerate() {
    if !current.is_object() {
      *current = Value::Object(Map::new());
    }
    let map = current.as_object_mut().expect("object ensured above");
    if i == segments.len() - 1 {
      map.insert(segment.to_string(), value);
      return;
    }
    current = map
      .entry(segment.to_string())
      .or_insert_with(|| Value::Object(Map::new()));
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use tokio_util::sync::CancellationToken;

  fn ctx() -> NodeContext {
    NodeContext {
      run_id: "run".to_string(),
      node_id: "json-0".to_string(),
      node_name: "json-0".to_string(),
      outputs: Arc::new(OutputMap::new()),
      cancel: CancellationToken::new(),
    }
  }

  async fn run(params: Value, input: Option<Value>) -> Result<Value, NodeError> {
    let params = params.as_object().cloned().unwrap();
    let mut inputs = NodeInputs::new();
    if let Some(input) = input {
      inputs.insert("input", input);
    }
    JsonHandler.execute(&ctx(), &params, &inputs).await
  }

  #[tokio::test]
  async fn test_parse_string_input() {
    let result = run(json!({"json": r#"{"a": [1, 2]}"#}), None).await.unwrap();
    assert_eq!(result, json!({"a": [1, 2]}));
  }

  #[tokio::test]
  async fn test_parse_invalid_json_fails() {
    let result = run(json!({"json": "{broken"}), None).await;
    assert!(matches!(result, Err(NodeError::Handler { .. })));
  }

  #[tokio::test]
  async fn test_get_dotted_path_with_index() {
    let result = run(
      json!({"operation": "get", "path": "items.1.name"}),
      Some(json!({"items": [{"name": "a"}, {"name": "b"}]})),
    )
    .await
    .unwrap();
    assert_eq!(result, "b");
  }

  #[tokio::test]
  async fn test_get_missing_path_is_null() {
    let result = run(
      json!({"operation": "get", "path": "missing.deep"}),
      Some(json!({"a": 1})),
    )
    .await
    .unwrap();
    assert_eq!(result, Value::Null);
  }

  #[tokio::test]
  async fn test_set_creates_intermediates() {
    let result = run(
      json!({"operation": "set", "path": "user.name", "value": "ada"}),
      Some(json!({})),
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"user": {"name": "ada"}}));
  }

  #[tokio::test]
  async fn test_keys_values_length() {
    let source = json!({"a": 1, "b": 2});
    let keys = run(json!({"operation": "keys"}), Some(source.clone())).await.unwrap();
    assert_eq!(keys, json!(["a", "b"]));

    let values = run(json!({"operation": "values"}), Some(source.clone())).await.unwrap();
    assert_eq!(values, json!([1, 2]));

    let length = run(json!({"operation": "length"}), Some(source)).await.unwrap();
    assert_eq!(length, 2);
  }

  #[tokio::test]
  async fn test_stringify_round_trip() {
    let source = json!({"a": 1});
    let text = run(json!({"operation": "stringify"}), Some(source.clone()))
      .await
      .unwrap();
    let parsed = run(json!({}), Some(text)).await.unwrap();
    assert_eq!(parsed, source);
  }

  #[tokio::test]
  async fn test_merge_shallow_later_wins() {
    let mut inputs = NodeInputs::new();
    inputs.insert("a", json!({"x": 1, "y": 1}));
    inputs.insert("b", json!({"y": 2}));

    let params = json!({"operation": "merge"}).as_object().cloned().unwrap();
    let result = JsonHandler.execute(&ctx(), &params, &inputs).await.unwrap();
    assert_eq!(result, json!({"x": 1, "y": 2}));
  }
}
