use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use freesia_node::{NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::to_text;

/// Branching node: evaluates an ordered list of paths and reports the first
/// match as `matched_path`.
///
/// The scheduler reads `matched_path` from the published output and marks
/// every other outgoing edge as condition-skipped; when no path matches,
/// every outgoing edge is skipped.
pub struct ConditionHandler;

#[derive(Debug, Deserialize)]
struct PathDef {
  #[serde(default)]
  id: Option<String>,
  #[serde(default)]
  logic: Logic,
  #[serde(default)]
  clauses: Vec<ClauseDef>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum Logic {
  #[default]
  And,
  Or,
}

#[derive(Debug, Deserialize)]
struct ClauseDef {
  #[serde(alias = "inputField", alias = "input_field")]
  field: String,
  operator: String,
  #[serde(default)]
  value: Value,
}

#[async_trait]
impl NodeHandler for ConditionHandler {
  async fn execute(
    &self,
    _ctx: &NodeContext,
    params: &OutputMap,
    inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    let paths: Vec<PathDef> = params
      .get("paths")
      .cloned()
      .map(serde_json::from_value)
      .transpose()
      .map_err(|e| NodeError::handler("parse", format!("invalid condition paths: {}", e)))?
      .unwrap_or_default();

    let scope = inputs.as_value();

    for (index, path) in paths.iter().enumerate() {
      if path_matches(path, &scope)? {
        let id = path
          .id
          .clone()
          .unwrap_or_else(|| format!("p{}", index));
        return Ok(json!({"output": id.clone(), "matched_path": id}));
      }
    }

    Ok(json!({"output": null, "matched_path": null}))
  }
}

fn path_matches(path: &PathDef, scope: &Value) -> Result<bool, NodeError> {
  // A clauseless path is an else-branch: it always matches.
  if path.clauses.is_empty() {
    return Ok(true);
  }

  let mut any = false;
  let mut all = true;
  for clause in &path.clauses {
    let actual = lookup_path(scope, &clause.field);
    let matched = apply_operator(&clause.operator, &actual, &clause.value)?;
    any |= matched;
    all &= matched;
  }

  Ok(match path.logic {
    Logic::And => all,
    Logic::Or => any,
  })
}

/// Dotted-path lookup into the assembled inputs. A path whose first segment
/// is not a bound handle is retried underneath the default `input` handle.
fn lookup_path(scope: &Value, path: &str) -> Value {
  fn descend<'a>(mut value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    for segment in segments {
      value = match value {
        Value::Object(map) => map.get(*segment)?,
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
        _ => return None,
      };
    }
    Some(value)
  }

  let segments: Vec<&str> = path.split('.').collect();
  if let Some(found) = descend(scope, &segments) {
    return found.clone();
  }
  if let Some(input) = scope.get("input") {
    if let Some(found) = descend(input, &segments) {
      return found.clone();
    }
  }
  Value::Null
}

fn apply_operator(operator: &str, actual: &Value, expected: &Value) -> Result<bool, NodeError> {
  let result = match operator {
    "==" => loose_eq(actual, expected),
    "!=" => !loose_eq(actual, expected),
    ">" | ">=" | "<" | "<=" => compare(operator, actual, expected),
    "contains" => contains(actual, expected),
    "not_contains" => !contains(actual, expected),
    "startswith" => to_text(actual).starts_with(&to_text(expected)),
    "endswith" => to_text(actual).ends_with(&to_text(expected)),
    "is_empty" => is_empty(actual),
    "is_not_empty" => !is_empty(actual),
    "matches_regex" => {
      let re = Regex::new(&to_text(expected))
        .map_err(|e| NodeError::handler("parse", format!("invalid regex: {}", e)))?;
      re.is_match(&to_text(actual))
    }
    "in_list" => in_list(actual, expected),
    "not_in_list" => !in_list(actual, expected),
    "length_equals" => length_of(actual).is_some_and(|l| Some(l) == expected_len(expected)),
    "length_greater_than" => {
      length_of(actual).zip(expected_len(expected)).is_some_and(|(l, e)| l > e)
    }
    "length_less_than" => {
      length_of(actual).zip(expected_len(expected)).is_some_and(|(l, e)| l < e)
    }
    "date_before" => date_pair(actual, expected).is_some_and(|(a, b)| a < b),
    "date_after" => date_pair(actual, expected).is_some_and(|(a, b)| a > b),
    "date_equals" => {
      date_pair(actual, expected).is_some_and(|(a, b)| a.date_naive() == b.date_naive())
    }
    "date_between" => date_between(actual, expected),
    "type_equals" => type_equals(actual, expected),
    other => {
      return Err(NodeError::handler(
        "parse",
        format!("unknown condition operator '{}'", other),
      ));
    }
  };
  Ok(result)
}

/// Equality across representation gaps: direct value equality, then numeric
/// equality, then textual equality.
fn loose_eq(a: &Value, b: &Value) -> bool {
  if a == b {
    return true;
  }
  if let (Some(x), Some(y)) = (crate::params::as_number(a), crate::params::as_number(b)) {
    return x == y;
  }
  to_text(a) == to_text(b)
}

fn compare(operator: &str, a: &Value, b: &Value) -> bool {
  let ordering = match (crate::params::as_number(a), crate::params::as_number(b)) {
    (Some(x), Some(y)) => x.partial_cmp(&y),
    _ => Some(to_text(a).cmp(&to_text(b))),
  };
  let Some(ordering) = ordering else {
    return false;
  };
  match operator {
    ">" => ordering.is_gt(),
    ">=" => ordering.is_ge(),
    "<" => ordering.is_lt(),
    _ => ordering.is_le(),
  }
}

fn contains(actual: &Value, expected: &Value) -> bool {
  match actual {
    Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
    Value::Object(map) => map.contains_key(&to_text(expected)),
    _ => to_text(actual).contains(&to_text(expected)),
  }
}

fn is_empty(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Object(map) => map.is_empty(),
    _ => false,
  }
}

fn in_list(actual: &Value, expected: &Value) -> bool {
  match expected {
    Value::Array(items) => items.iter().any(|item| loose_eq(actual, item)),
    Value::String(s) => {
      let needle = to_text(actual);
      s.split(',').any(|item| item.trim() == needle)
    }
    _ => false,
  }
}

fn length_of(value: &Value) -> Option<u64> {
  match value {
    Value::String(s) => Some(s.chars().count() as u64),
    Value::Array(items) => Some(items.len() as u64),
    Value::Object(map) => Some(map.len() as u64),
    _ => None,
  }
}

fn expected_len(expected: &Value) -> Option<u64> {
  crate::params::as_number(expected).map(|n| n as u64)
}

/// Parse a date value: RFC 3339 first, then `YYYY-MM-DD HH:MM:SS`, then a
/// bare `YYYY-MM-DD`.
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
  let text = to_text(value);
  let text = text.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
    return Some(naive.and_utc());
  }
  if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
    return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
  }
  None
}

fn date_pair(a: &Value, b: &Value) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
  Some((parse_date(a)?, parse_date(b)?))
}

fn date_between(actual: &Value, expected: &Value) -> bool {
  let Value::Array(bounds) = expected else {
    return false;
  };
  let (Some(start), Some(end)) = (bounds.first(), bounds.get(1)) else {
    return false;
  };
  let (Some(a), Some(s), Some(e)) = (parse_date(actual), parse_date(start), parse_date(end))
  else {
    return false;
  };
  s <= a && a <= e
}

fn type_equals(actual: &Value, expected: &Value) -> bool {
  let name = to_text(expected).to_ascii_lowercase();
  match name.as_str() {
    "string" | "text" => actual.is_string(),
    "number" => actual.is_number(),
    "integer" => actual.is_i64() || actual.is_u64(),
    "boolean" | "bool" => actual.is_boolean(),
    "array" | "list" => actual.is_array(),
    "object" | "dict" => actual.is_object(),
    "null" | "none" => actual.is_null(),
    _ => false,
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
      node_id: "condition-0".to_string(),
      node_name: "condition-0".to_string(),
      outputs: Arc::new(OutputMap::new()),
      cancel: CancellationToken::new(),
    }
  }

  async fn run(params: Value, input: Value) -> Value {
    let params = params.as_object().cloned().unwrap();
    let mut inputs = NodeInputs::new();
    inputs.insert("input", input);
    ConditionHandler
      .execute(&ctx(), &params, &inputs)
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_first_matching_path_wins() {
    let params = json!({
      "paths": [
        {"id": "p0", "clauses": [{"field": "input", "operator": ">", "value": 10}]},
        {"id": "p1", "clauses": [{"field": "input", "operator": ">", "value": 3}]}
      ]
    });
    let result = run(params, json!(7)).await;
    assert_eq!(result["matched_path"], "p1");
    assert_eq!(result["output"], "p1");
  }

  #[tokio::test]
  async fn test_no_match_returns_null() {
    let params = json!({
      "paths": [
        {"id": "p0", "clauses": [{"field": "input", "operator": "==", "value": "yes"}]}
      ]
    });
    let result = run(params, json!("no")).await;
    assert_eq!(result["matched_path"], Value::Null);
  }

  #[tokio::test]
  async fn test_and_or_logic() {
    let and_params = json!({
      "paths": [{"id": "p0", "logic": "AND", "clauses": [
        {"field": "input.a", "operator": "==", "value": 1},
        {"field": "input.b", "operator": "==", "value": 2}
      ]}]
    });
    let result = run(and_params, json!({"a": 1, "b": 3})).await;
    assert_eq!(result["matched_path"], Value::Null);

    let or_params = json!({
      "paths": [{"id": "p0", "logic": "OR", "clauses": [
        {"field": "input.a", "operator": "==", "value": 1},
        {"field": "input.b", "operator": "==", "value": 2}
      ]}]
    });
    let result = run(or_params, json!({"a": 1, "b": 3})).await;
    assert_eq!(result["matched_path"], "p0");
  }

  #[tokio::test]
  async fn test_default_path_id_and_else_branch() {
    let params = json!({
      "paths": [
        {"clauses": [{"field": "input", "operator": "is_empty"}]},
        {}
      ]
    });
    let result = run(params, json!("text")).await;
    assert_eq!(result["matched_path"], "p1");
  }

  #[tokio::test]
  async fn test_dotted_path_under_default_handle() {
    let params = json!({
      "paths": [{"id": "adult", "clauses": [
        {"inputField": "user.age", "operator": ">=", "value": 18}
      ]}]
    });
    let result = run(params, json!({"user": {"age": 21}})).await;
    assert_eq!(result["matched_path"], "adult");
  }

  #[tokio::test]
  async fn test_unknown_operator_fails() {
    let params = json!({
      "paths": [{"clauses": [{"field": "input", "operator": "resembles", "value": 1}]}]
    })
    .as_object()
    .cloned()
    .unwrap();
    let mut inputs = NodeInputs::new();
    inputs.insert("input", json!(1));

    let result = ConditionHandler.execute(&ctx(), &params, &inputs).await;
    assert!(matches!(result, Err(NodeError::Handler { .. })));
  }

  #[test]
  fn test_string_operators() {
    assert!(apply_operator("contains", &json!("workflow"), &json!("flow")).unwrap());
    assert!(apply_operator("not_contains", &json!("workflow"), &json!("x")).unwrap());
    assert!(apply_operator("startswith", &json!("workflow"), &json!("work")).unwrap());
    assert!(apply_operator("endswith", &json!("workflow"), &json!("flow")).unwrap());
    assert!(apply_operator("matches_regex", &json!("ab12"), &json!(r"^[a-z]+\d+$")).unwrap());
  }

  #[test]
  fn test_numeric_comparison_coerces_strings() {
    assert!(apply_operator(">", &json!("10"), &json!(9)).unwrap());
    assert!(apply_operator("<=", &json!(3), &json!("3")).unwrap());
    assert!(apply_operator("==", &json!("5"), &json!(5)).unwrap());
  }

  #[test]
  fn test_list_and_length_operators() {
    assert!(apply_operator("in_list", &json!("b"), &json!(["a", "b"])).unwrap());
    assert!(apply_operator("in_list", &json!("b"), &json!("a, b, c")).unwrap());
    assert!(apply_operator("not_in_list", &json!("z"), &json!(["a", "b"])).unwrap());
    assert!(apply_operator("length_equals", &json!([1, 2, 3]), &json!(3)).unwrap());
    assert!(apply_operator("length_greater_than", &json!("abcd"), &json!(3)).unwrap());
    assert!(apply_operator("length_less_than", &json!("ab"), &json!(3)).unwrap());
  }

  #[test]
  fn test_empty_operators() {
    assert!(apply_operator("is_empty", &json!(""), &Value::Null).unwrap());
    assert!(apply_operator("is_empty", &json!([]), &Value::Null).unwrap());
    assert!(apply_operator("is_not_empty", &json!("x"), &Value::Null).unwrap());
  }

  #[test]
  fn test_date_operators() {
    assert!(
      apply_operator("date_before", &json!("2024-01-01"), &json!("2024-06-01")).unwrap()
    );
    assert!(
      apply_operator("date_after", &json!("2024-06-01T12:00:00Z"), &json!("2024-01-01"))
        .unwrap()
    );
    assert!(
      apply_operator(
        "date_equals",
        &json!("2024-06-01T23:59:00Z"),
        &json!("2024-06-01")
      )
      .unwrap()
    );
    assert!(
      apply_operator(
        "date_between",
        &json!("2024-03-15"),
        &json!(["2024-01-01", "2024-12-31"])
      )
      .unwrap()
    );
  }

  #[test]
  fn test_type_equals() {
    assert!(apply_operator("type_equals", &json!("s"), &json!("string")).unwrap());
    assert!(apply_operator("type_equals", &json!(1.5), &json!("number")).unwrap());
    assert!(apply_operator("type_equals", &json!([1]), &json!("array")).unwrap());
    assert!(!apply_operator("type_equals", &json!(1), &json!("string")).unwrap());
  }
}
