use async_trait::async_trait;
use serde_json::{Map, Number, Value, json};

use freesia_node::{NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::{as_number, str_param};

/// Join node: combines upstream values with a declared merge function.
///
/// Values arrive in edge declaration order; `create_object` keys them by
/// their target handle names.
pub struct MergeHandler;

#[async_trait]
impl NodeHandler for MergeHandler {
  async fn execute(
    &self,
    _ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    let function = str_param(params, "function")
      .or_else(|| str_param(params, "strategy"))
      .unwrap_or("pick_first");

    let values: Vec<Value> = inputs.values_in_order().into_iter().cloned().collect();

    let merged = match function {
      "pick_first" => values
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null),
      "join_all" => join_all(&values, str_param(params, "delimiter").unwrap_or(", ")),
      "concat_arrays" => {
        let mut items = Vec::new();
        for value in values {
          match value {
            Value::Array(inner) => items.extend(inner),
            other => items.push(other),
          }
        }
        Value::Array(items)
      }
      "merge_objects" => {
        let mut merged = Map::new();
        for value in values {
          if let Value::Object(map) = value {
            deep_merge(&mut merged, map);
          }
        }
        Value::Object(merged)
      }
      "avg" | "min" | "max" => numeric_fold(function, &values)?,
      "create_object" => Value::Object(inputs.entries().clone()),
      other => {
        return Err(NodeError::handler(
          "parse",
          format!("unknown merge function '{}'", other),
        ));
      }
    };

    Ok(json!({"output": merged}))
  }
}

/// Join semantics depend on the value shapes: all-numeric sums, all-string
/// joins with the delimiter, anything mixed stays a list.
fn join_all(values: &[Value], delimiter: &str) -> Value {
  if !values.is_empty() && values.iter().all(Value::is_number) {
    if values.iter().all(|v| v.is_i64()) {
      let sum: i64 = values.iter().filter_map(Value::as_i64).sum();
      return Value::Number(sum.into());
    }
    let sum: f64 = values.iter().filter_map(Value::as_f64).sum();
    return Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null);
  }

  if values.iter().all(Value::is_string) {
    return Value::String(
      values
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(delimiter),
    );
  }

  Value::Array(values.to_vec())
}

fn numeric_fold(function: &str, values: &[Value]) -> Result<Value, NodeError> {
  let numbers: Vec<f64> = values.iter().filter_map(as_number).collect();
  if numbers.is_empty() {
    return Err(NodeError::handler(
      "parse",
      format!("merge function '{}' requires numeric inputs", function),
    ));
  }

  let folded = match function {
    "avg" => numbers.iter().sum::<f64>() / numbers.len() as f64,
    "min" => numbers.iter().cloned().fold(f64::INFINITY, f64::min),
    _ => numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
  };

  Ok(Number::from_f64(folded).map(Value::Number).unwrap_or(Value::Null))
}

/// Recursive object merge, later values winning on conflicts.
fn deep_merge(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
  for (key, value) in incoming {
    match (target.get_mut(&key), value) {
      (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
      (_, value) => {
        target.insert(key, value);
      }
    }
  }
}
