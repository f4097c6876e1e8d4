//! Built-in node handlers.
//!
//! These cover the non-integration node kinds: `input`, `output`,
//! `condition`, `merge`, `time`, `text_processor`, `json_handler`, and
//! `file_transformer`. Integration and AI handlers live outside this crate
//! and register through the same [`NodeRegistry`] surface.

use std::sync::Arc;

use freesia_node::NodeRegistry;

mod condition;
mod file;
mod input;
mod json;
mod merge;
mod output;
mod params;
mod text;
mod time;

pub use condition::ConditionHandler;
pub use file::FileTransformerHandler;
pub use input::InputHandler;
pub use json::JsonHandler;
pub use merge::MergeHandler;
pub use output::OutputHandler;
pub use text::TextProcessorHandler;
pub use time::TimeHandler;

/// Register every built-in handler under its type tag.
pub fn register_builtins(registry: &mut NodeRegistry) {
  registry.register("input", Arc::new(InputHandler));
  registry.register("output", Arc::new(OutputHandler));
  registry.register("condition", Arc::new(ConditionHandler));
  registry.register("merge", Arc::new(MergeHandler));
  registry.register("time", Arc::new(TimeHandler));
  registry.register("text_processor", Arc::new(TextProcessorHandler));
  registry.register("json_handler", Arc::new(JsonHandler));
  registry.register("file_transformer", Arc::new(FileTransformerHandler));
}

/// A registry pre-loaded with all built-ins.
pub fn builtin_registry() -> NodeRegistry {
  let mut registry = NodeRegistry::new();
  register_builtins(&mut registry);
  registry
}
