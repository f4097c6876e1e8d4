//! Workflow document model and graph analysis.
//!
//! A workflow is a directed acyclic graph of typed nodes. This crate holds
//! the serde representation of the workflow document, structural validation
//! (duplicate ids, dangling edges, cycles), and the [`Graph`] used for
//! traversal and scheduling decisions.

mod document;
mod error;
mod graph;

pub use document::{EdgeDef, NodeData, NodeDef, WorkflowDef};
pub use error::WorkflowError;
pub use graph::{Graph, IncomingEdge};
