//! Variable template resolution.
//!
//! Templates are plain strings containing `{{ node.field }}` tokens that are
//! substituted with values from the run's output table. The resolver is a
//! single pass over the token list: substituted text is never re-scanned,
//! and unresolved tokens are preserved verbatim with a warning instead of
//! failing the node.
//!
//! Workflows authored over time carry inconsistent node id conventions
//! (`input_0`, `input-0`, `input_input0`), so node lookup applies a fixed
//! set of normalization rules rather than exact matching alone.

mod resolver;

pub use resolver::{Resolved, TemplateWarning, resolve};
