//! Node handler contract for the freesia engine.
//!
//! Every node kind, built-in or integration, implements [`NodeHandler`] and
//! registers under its type tag in a [`NodeRegistry`]. Handlers receive a
//! [`NodeContext`] (read-only output snapshot plus cancellation token),
//! template-resolved params, and the assembled [`NodeInputs`]; they return
//! any JSON value, which the engine passes through [`NodeOutput::normalize`]
//! before publishing.

mod context;
mod error;
mod handler;
mod inputs;
mod output;
mod registry;

pub use context::NodeContext;
pub use error::NodeError;
pub use handler::{HandlerKind, NodeHandler};
pub use inputs::{NodeInputs, RunInputs};
pub use output::{ALIAS_FIELDS, IoKind, NodeOutput};
pub use registry::NodeRegistry;

/// A JSON object with stable key order, used for output records and params.
pub type OutputMap = serde_json::Map<String, serde_json::Value>;
