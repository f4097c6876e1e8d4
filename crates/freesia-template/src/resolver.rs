use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Token shape: `{{` optional whitespace, `ref.field`, optional whitespace,
/// `}}`. Anything else is not a token and passes through untouched.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)\.([A-Za-z0-9_\-]+)\s*\}\}").expect("token regex")
});

/// Field fallback order when the requested field is absent.
const FIELD_FALLBACK: [&str; 6] = ["output", "text", "content", "response", "result", "value"];

/// Fields that never stand in for a missing value field.
const METADATA_FIELDS: [&str; 6] = [
  "type",
  "node_name",
  "usage",
  "model",
  "execution_time",
  "input_raw",
];

/// Node id families with historically loose naming.
const FAMILY_PREFIXES: [&str; 2] = ["input", "output"];

/// Result of resolving one template.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
  pub text: String,
  pub warnings: Vec<TemplateWarning>,
}

/// An unresolved token, preserved verbatim in the output text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateWarning {
  pub token: String,
  pub reason: String,
}

/// Substitute `{{ node.field }}` tokens against the output table.
///
/// The table maps node id to that node's output record (a JSON object).
/// Pure: the table is never mutated, identical inputs give identical output
/// and warnings.
pub fn resolve(template: &str, outputs: &Map<String, Value>) -> Resolved {
  let mut text = String::with_capacity(template.len());
  let mut warnings = Vec::new();
  let mut last = 0;

  for caps in TOKEN_RE.captures_iter(template) {
    let whole = caps.get(0).expect("regex match");
    text.push_str(&template[last..whole.start()]);
    last = whole.end();

    let node_ref = &caps[1];
    let field = &caps[2];

    match lookup(node_ref, field, outputs) {
      Ok(value) => text.push_str(&stringify(value)),
      Err(reason) => {
        text.push_str(whole.as_str());
        warnings.push(TemplateWarning {
          token: format!("{}.{}", node_ref, field),
          reason,
        });
      }
    }
  }

  text.push_str(&template[last..]);
  Resolved { text, warnings }
}

/// Find the value a token refers to, or a reason why it cannot be found.
fn lookup<'a>(
  node_ref: &str,
  field: &str,
  outputs: &'a Map<String, Value>,
) -> Result<&'a Value, String> {
  let key =
    match_node_key(node_ref, outputs).ok_or_else(|| format!("no output for node '{}'", node_ref))?;

  let record = outputs
    .get(key)
    .and_then(Value::as_object)
    .ok_or_else(|| format!("output for node '{}' is not a record", key))?;

  resolve_field(field, record)
    .ok_or_else(|| format!("node '{}' has no field '{}'", key, field))
}

/// Normalize a requested node reference against the table's keys.
///
/// Rules, in order: exact match; `-`/`_` exchange; trailing-integer
/// alignment; family-prefix fuzzy match. Keys are scanned in table order so
/// the result is deterministic.
fn match_node_key<'a>(requested: &str, outputs: &'a Map<String, Value>) -> Option<&'a str> {
  if let Some((key, _)) = outputs.get_key_value(requested) {
    return Some(key);
  }

  let underscored = requested.replace('-', "_");
  if let Some((key, _)) = outputs.get_key_value(&underscored) {
    return Some(key);
  }
  let dashed = requested.replace('_', "-");
  if let Some((key, _)) = outputs.get_key_value(&dashed) {
    return Some(key);
  }

  let (prefix, number) = split_trailing_int(requested)?;

  // Same trailing integer and the requested prefix occurs inside the
  // candidate key (separators normalized): `input_0` -> `input_input0`.
  let normalized_prefix = underscore(prefix);
  for key in outputs.keys() {
    if let Some((_, candidate_number)) = split_trailing_int(key) {
      if candidate_number == number && underscore(key).contains(&normalized_prefix) {
        return Some(key);
      }
    }
  }

  // Family fuzzy match: `input_3` -> any key mentioning `input` that ends
  // in the same integer.
  for family in FAMILY_PREFIXES {
    let named = underscore(requested);
    if !named.starts_with(&format!("{}_", family)) {
      continue;
    }
    for key in outputs.keys() {
      if let Some((_, candidate_number)) = split_trailing_int(key) {
        if candidate_number == number && underscore(key).contains(family) {
          return Some(key);
        }
      }
    }
  }

  None
}

/// Resolve a field against a node output record.
fn resolve_field<'a>(field: &str, record: &'a Map<String, Value>) -> Option<&'a Value> {
  if let Some(value) = record.get(field) {
    return Some(value);
  }
  if let Some(value) = record.get(&field.to_lowercase()) {
    return Some(value);
  }
  for fallback in FIELD_FALLBACK {
    if let Some(value) = record.get(fallback) {
      return Some(value);
    }
  }
  record
    .iter()
    .find(|(key, _)| !METADATA_FIELDS.contains(&key.as_str()))
    .map(|(_, value)| value)
}

/// Split a trailing integer off a node reference: `openai-12` -> (`openai-`, 12).
fn split_trailing_int(s: &str) -> Option<(&str, u64)> {
  let digits = s.len() - s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
  if digits == 0 {
    return None;
  }
  let (prefix, suffix) = s.split_at(s.len() - digits);
  suffix.parse().ok().map(|n| (prefix, n))
}

fn underscore(s: &str) -> String {
  s.replace('-', "_")
}

/// Textual form of a resolved value: strings pass through, null is empty,
/// structured values render as canonical JSON.
fn stringify(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    other => serde_json::to_string(other).unwrap_or_default(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn table(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  #[test]
  fn test_zero_tokens_returns_input_unchanged() {
    let outputs = table(&[]);
    let resolved = resolve("no tokens here, even {single} braces", &outputs);
    assert_eq!(resolved.text, "no tokens here, even {single} braces");
    assert!(resolved.warnings.is_empty());
  }

  #[test]
  fn test_exact_match_and_whitespace() {
    let outputs = table(&[("input_0", json!({"output": "hi", "text": "hi"}))]);
    let resolved = resolve("a {{input_0.text}} b {{ input_0.text }} c", &outputs);
    assert_eq!(resolved.text, "a hi b hi c");
    assert!(resolved.warnings.is_empty());
  }

  #[test]
  fn test_dash_underscore_exchange_is_symmetric() {
    let outputs = table(&[("openai-0", json!({"output": "x"}))]);
    assert_eq!(resolve("{{openai_0.output}}", &outputs).text, "x");

    let outputs = table(&[("openai_0", json!({"output": "x"}))]);
    assert_eq!(resolve("{{openai-0.output}}", &outputs).text, "x");
  }

  #[test]
  fn test_trailing_integer_alignment() {
    // Historical ids: the table key doubles the family name.
    let outputs = table(&[("input_input0", json!({"output": "hello", "text": "hello"}))]);
    let resolved = resolve("{{input_0.text}}", &outputs);
    assert_eq!(resolved.text, "hello");
    assert!(resolved.warnings.is_empty());
  }

  #[test]
  fn test_family_prefix_fuzzy() {
    let outputs = table(&[("user_input3", json!({"output": "deep"}))]);
    let resolved = resolve("{{input_3.output}}", &outputs);
    assert_eq!(resolved.text, "deep");
  }

  #[test]
  fn test_number_suffix_must_match() {
    let outputs = table(&[("input_input1", json!({"output": "one"}))]);
    let resolved = resolve("{{input_0.output}}", &outputs);
    assert_eq!(resolved.text, "{{input_0.output}}");
    assert_eq!(resolved.warnings.len(), 1);
  }

  #[test]
  fn test_field_fallback_order() {
    let outputs = table(&[("n0", json!({"response": "r", "content": "c"}))]);
    // `answer` is unknown; fallback order reaches `content` before `response`.
    assert_eq!(resolve("{{n0.answer}}", &outputs).text, "c");
  }

  #[test]
  fn test_lowercase_field_retry() {
    let outputs = table(&[("n0", json!({"output": "p", "Summary": "s"}))]);
    assert_eq!(resolve("{{n0.Summary}}", &outputs).text, "s");
  }

  #[test]
  fn test_first_non_metadata_fallback() {
    let outputs = table(&[(
      "n0",
      json!({"type": "custom", "node_name": "n", "score": 7}),
    )]);
    assert_eq!(resolve("{{n0.anything}}", &outputs).text, "7");
  }

  #[test]
  fn test_unresolved_node_preserved_with_warning() {
    let outputs = table(&[("input_0", json!({"output": "hi", "text": "hi"}))]);
    let resolved = resolve("{{ghost.output}} {{input_0.text}}", &outputs);
    assert_eq!(resolved.text, "{{ghost.output}} hi");
    assert_eq!(resolved.warnings.len(), 1);
    assert_eq!(resolved.warnings[0].token, "ghost.output");
  }

  #[test]
  fn test_multiple_unresolved_tokens_all_warn() {
    let outputs = table(&[]);
    let resolved = resolve("{{a.x}} {{b.y}}", &outputs);
    assert_eq!(resolved.text, "{{a.x}} {{b.y}}");
    assert_eq!(resolved.warnings.len(), 2);
  }

  #[test]
  fn test_malformed_token_left_verbatim_without_warning() {
    let outputs = table(&[("n0", json!({"output": "x"}))]);
    let resolved = resolve("{{n0}} {{n0 .output}} {{.output}}", &outputs);
    assert_eq!(resolved.text, "{{n0}} {{n0 .output}} {{.output}}");
    assert!(resolved.warnings.is_empty());
  }

  #[test]
  fn test_value_coercion() {
    let outputs = table(&[(
      "n0",
      json!({
        "output": 1,
        "count": 42,
        "flag": true,
        "items": [1, 2],
        "obj": {"k": "v"},
        "nothing": null
      }),
    )]);
    assert_eq!(resolve("{{n0.count}}", &outputs).text, "42");
    assert_eq!(resolve("{{n0.flag}}", &outputs).text, "true");
    assert_eq!(resolve("{{n0.items}}", &outputs).text, "[1,2]");
    assert_eq!(resolve("{{n0.obj}}", &outputs).text, r#"{"k":"v"}"#);
    assert_eq!(resolve("{{n0.nothing}}", &outputs).text, "");
  }

  #[test]
  fn test_substituted_text_is_not_rescanned() {
    let outputs = table(&[("n0", json!({"output": "{{n0.output}}"}))]);
    // A single pass: the substituted token text is emitted as-is.
    assert_eq!(resolve("{{n0.output}}", &outputs).text, "{{n0.output}}");
  }

  #[test]
  fn test_resolver_is_pure() {
    let outputs = table(&[("input_0", json!({"output": "hi"}))]);
    let a = resolve("{{input_0.output}} {{ghost.x}}", &outputs);
    let b = resolve("{{input_0.output}} {{ghost.x}}", &outputs);
    assert_eq!(a, b);
  }
}
