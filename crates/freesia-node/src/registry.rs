use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::NodeHandler;

/// Maps node type tags to handlers.
///
/// Handlers register at engine init; the engine validates every node's type
/// against the registry before any handler runs. An engine instance owns its
/// registry - there is no process-wide handler table.
#[derive(Default)]
pub struct NodeRegistry {
  handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler under a type tag, replacing any previous handler.
  pub fn register(&mut self, type_tag: impl Into<String>, handler: Arc<dyn NodeHandler>) {
    self.handlers.insert(type_tag.into(), handler);
  }

  pub fn get(&self, type_tag: &str) -> Option<Arc<dyn NodeHandler>> {
    self.handlers.get(type_tag).cloned()
  }

  pub fn contains(&self, type_tag: &str) -> bool {
    self.handlers.contains_key(type_tag)
  }

  /// Registered type tags, for diagnostics.
  pub fn type_tags(&self) -> impl Iterator<Item = &str> {
    self.handlers.keys().map(|s| s.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::NodeContext;
  use crate::error::NodeError;
  use crate::inputs::NodeInputs;
  use crate::OutputMap;
  use async_trait::async_trait;
  use serde_json::{Value, json};

  struct EchoHandler;

  #[async_trait]
  impl NodeHandler for EchoHandler {
    async fn execute(
      &self,
      _ctx: &NodeContext,
      params: &OutputMap,
      _inputs: &NodeInputs,
    ) -> Result<Value, NodeError> {
      Ok(params.get("value").cloned().unwrap_or(Value::Null))
    }
  }

  #[test]
  fn test_register_and_lookup() {
    let mut registry = NodeRegistry::new();
    registry.register("echo", Arc::new(EchoHandler));

    assert!(registry.contains("echo"));
    assert!(registry.get("echo").is_some());
    assert!(!registry.contains("ghost"));
  }

  #[tokio::test]
  async fn test_dispatch_through_registry() {
    let mut registry = NodeRegistry::new();
    registry.register("echo", Arc::new(EchoHandler));

    let ctx = NodeContext {
      run_id: "run".to_string(),
      node_id: "echo-0".to_string(),
      node_name: "echo-0".to_string(),
      outputs: Arc::new(OutputMap::new()),
      cancel: tokio_util::sync::CancellationToken::new(),
    };
    let mut params = OutputMap::new();
    params.insert("value".to_string(), json!("hi"));

    let handler = registry.get("echo").unwrap();
    let result = handler
      .execute(&ctx, &params, &NodeInputs::new())
      .await
      .unwrap();
    assert_eq!(result, "hi");
  }
}
