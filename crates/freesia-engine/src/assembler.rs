//! Input assembly: the only place template resolution happens.
//!
//! For each node about to run, the assembler binds upstream primary values
//! by target handle, merges ambient run inputs for input-typed nodes, and
//! deep-copies the node's params with every contained string passed through
//! the template resolver.

use serde_json::Value;

use freesia_node::{IoKind, NodeInputs, OutputMap, RunInputs};
use freesia_template::{TemplateWarning, resolve};
use freesia_workflow::{IncomingEdge, NodeDef};

/// Ambient run inputs, offered to input-typed nodes only.
#[derive(Debug, Clone, Copy)]
pub struct AmbientInputs<'a> {
  pub run_inputs: &'a RunInputs,
  /// Declaration index among input nodes, the `input_<n>` fallback when the
  /// node id carries no trailing integer.
  pub index: usize,
}

/// A node's fully prepared execution inputs.
#[derive(Debug)]
pub struct AssembledNode {
  /// Params with every string template-resolved, recursively.
  pub params: OutputMap,
  pub inputs: NodeInputs,
  /// Declared I/O type, for input nodes.
  pub io_kind: Option<IoKind>,
  pub warnings: Vec<TemplateWarning>,
}

/// Assemble inputs and resolved params for one node.
pub fn assemble(
  node: &NodeDef,
  incoming: &[IncomingEdge],
  outputs: &OutputMap,
  ambient: Option<AmbientInputs<'_>>,
) -> AssembledNode {
  let mut inputs = NodeInputs::new();

  // Group incoming edges by target handle, preserving declaration order.
  // Sources without a published output (failed or skipped) contribute
  // nothing.
  let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
  for edge in incoming {
    let Some(primary) = outputs
      .get(&edge.source)
      .and_then(|record| record.get("output"))
    else {
      continue;
    };

    let handle = edge.target_handle.as_deref().unwrap_or("input");
    match groups.iter_mut().find(|(name, _)| name == handle) {
      Some((_, values)) => values.push(primary.clone()),
      None => groups.push((handle.to_string(), vec![primary.clone()])),
    }
  }
  for (handle, mut values) in groups {
    if values.len() == 1 {
      inputs.insert(handle, values.remove(0));
    } else {
      inputs.insert_many(handle, values);
    }
  }

  // Ambient run inputs bind under the `input` handle, by key precedence.
  let mut io_kind = None;
  if let Some(ambient) = ambient {
    if let Some((value, kind)) = lookup_ambient(node, ambient) {
      io_kind = kind;
      inputs.insert("input", value.clone());
    }
  }

  io_kind = io_kind.or_else(|| {
    node
      .params()
      .get("input_type")
      .and_then(Value::as_str)
      .and_then(IoKind::parse)
  });
  if let Some(kind) = io_kind {
    inputs.insert("input_type", Value::String(kind.field_name().to_string()));
  }

  let mut warnings = Vec::new();
  let params = node
    .params()
    .iter()
    .map(|(key, value)| (key.clone(), resolve_value(value, outputs, &mut warnings)))
    .collect();

  AssembledNode {
    params,
    inputs,
    io_kind,
    warnings,
  }
}

/// Ambient key precedence: `input`, `input_<n>`, node name, raw id.
fn lookup_ambient<'a>(
  node: &NodeDef,
  ambient: AmbientInputs<'a>,
) -> Option<(&'a Value, Option<IoKind>)> {
  let index = trailing_int(&node.id).unwrap_or(ambient.index as u64);
  let keys = [
    "input".to_string(),
    format!("input_{}", index),
    node.node_name().to_string(),
    node.id.clone(),
  ];
  keys.iter().find_map(|key| ambient.run_inputs.get(key))
}

fn trailing_int(s: &str) -> Option<u64> {
  let digits = s.len() - s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
  if digits == 0 {
    return None;
  }
  s[s.len() - digits..].parse().ok()
}

/// Resolve every string in a params value, recursing through arrays and
/// objects. Handlers receive these as-is and never re-interpret `{{...}}`.
fn resolve_value(value: &Value, outputs: &OutputMap, warnings: &mut Vec<TemplateWarning>) -> Value {
  match value {
    Value::String(template) => {
      let resolved = resolve(template, outputs);
      warnings.extend(resolved.warnings);
      Value::String(resolved.text)
    }
    Value::Array(items) => Value::Array(
      items
        .iter()
        .map(|item| resolve_value(item, outputs, warnings))
        .collect(),
    ),
    Value::Object(map) => Value::Object(
      map
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, outputs, warnings)))
        .collect(),
    ),
    other => other.clone(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn node(id: &str, node_type: &str, params: Value) -> NodeDef {
    serde_json::from_value(json!({
      "id": id,
      "type": node_type,
      "data": {"params": params}
    }))
    .unwrap()
  }

  fn edge(source: &str, target_handle: Option<&str>) -> IncomingEdge {
    IncomingEdge {
      source: source.to_string(),
      source_handle: None,
      target_handle: target_handle.map(str::to_string),
    }
  }

  fn outputs(entries: &[(&str, Value)]) -> OutputMap {
    entries
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  #[test]
  fn test_single_edge_binds_primary() {
    let outputs = outputs(&[("a", json!({"output": "va"}))]);
    let assembled = assemble(
      &node("b", "output", json!({})),
      &[edge("a", None)],
      &outputs,
      None,
    );
    assert_eq!(assembled.inputs.get("input").unwrap(), "va");
  }

  #[test]
  fn test_multiple_edges_bind_list_in_order() {
    let outputs = outputs(&[
      ("a", json!({"output": "va"})),
      ("b", json!({"output": "vb"})),
    ]);
    let assembled = assemble(
      &node("m", "merge", json!({})),
      &[edge("a", None), edge("b", None)],
      &outputs,
      None,
    );
    assert_eq!(assembled.inputs.get("input").unwrap(), &json!(["va", "vb"]));
  }

  #[test]
  fn test_handles_group_separately() {
    let outputs = outputs(&[
      ("a", json!({"output": 1})),
      ("b", json!({"output": 2})),
    ]);
    let assembled = assemble(
      &node("m", "merge", json!({})),
      &[edge("a", Some("left")), edge("b", Some("right"))],
      &outputs,
      None,
    );
    assert_eq!(assembled.inputs.get("left").unwrap(), 1);
    assert_eq!(assembled.inputs.get("right").unwrap(), 2);
  }

  #[test]
  fn test_failed_sources_contribute_nothing() {
    let outputs = outputs(&[("a", json!({"output": "va"}))]);
    let assembled = assemble(
      &node("m", "merge", json!({})),
      &[edge("a", None), edge("dead", None)],
      &outputs,
      None,
    );
    // The live source still binds as a single value, not a list.
    assert_eq!(assembled.inputs.get("input").unwrap(), "va");
  }

  #[test]
  fn test_params_resolved_recursively() {
    let outputs = outputs(&[("input_0", json!({"output": "hi", "text": "hi"}))]);
    let assembled = assemble(
      &node(
        "n",
        "text_processor",
        json!({
          "text": "say {{input_0.text}}",
          "nested": {"inner": ["{{input_0.text}}!", 4]}
        }),
      ),
      &[],
      &outputs,
      None,
    );
    assert_eq!(assembled.params.get("text").unwrap(), "say hi");
    assert_eq!(
      assembled.params.get("nested").unwrap(),
      &json!({"inner": ["hi!", 4]})
    );
    assert!(assembled.warnings.is_empty());
  }

  #[test]
  fn test_unresolved_params_collect_warnings() {
    let outputs = OutputMap::new();
    let assembled = assemble(
      &node("n", "output", json!({"template": "{{ghost.output}}"})),
      &[],
      &outputs,
      None,
    );
    assert_eq!(assembled.warnings.len(), 1);
    assert_eq!(assembled.params.get("template").unwrap(), "{{ghost.output}}");
  }

  #[test]
  fn test_ambient_precedence() {
    let run_inputs: RunInputs = serde_json::from_value(json!({
      "input": "by-input",
      "input_0": "by-index",
      "my-input": "by-name"
    }))
    .unwrap();
    let ambient = AmbientInputs {
      run_inputs: &run_inputs,
      index: 0,
    };

    let assembled = assemble(&node("input_0", "input", json!({})), &[], &OutputMap::new(), Some(ambient));
    assert_eq!(assembled.inputs.get("input").unwrap(), "by-input");

    let run_inputs: RunInputs = serde_json::from_value(json!({
      "input_0": "by-index",
      "my-input": "by-name"
    }))
    .unwrap();
    let ambient = AmbientInputs {
      run_inputs: &run_inputs,
      index: 0,
    };
    let assembled = assemble(&node("input_0", "input", json!({})), &[], &OutputMap::new(), Some(ambient));
    assert_eq!(assembled.inputs.get("input").unwrap(), "by-index");
  }

  #[test]
  fn test_ambient_by_node_name_and_id() {
    let run_inputs: RunInputs =
      serde_json::from_value(json!({"question": "by-name"})).unwrap();
    let ambient = AmbientInputs {
      run_inputs: &run_inputs,
      index: 0,
    };
    let assembled = assemble(
      &node("input_7", "input", json!({"node_name": "question"})),
      &[],
      &OutputMap::new(),
      Some(ambient),
    );
    assert_eq!(assembled.inputs.get("input").unwrap(), "by-name");
  }

  #[test]
  fn test_typed_envelope_sets_io_kind() {
    let run_inputs: RunInputs = serde_json::from_value(json!({
      "input": {"value": "{\"a\": 1}", "type": "JSON"}
    }))
    .unwrap();
    let ambient = AmbientInputs {
      run_inputs: &run_inputs,
      index: 0,
    };
    let assembled = assemble(&node("input_0", "input", json!({})), &[], &OutputMap::new(), Some(ambient));
    assert_eq!(assembled.io_kind, Some(IoKind::Json));
    assert_eq!(assembled.inputs.get("input_type").unwrap(), "json");
  }
}
