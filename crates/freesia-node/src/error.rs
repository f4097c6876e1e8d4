use thiserror::Error;

/// Errors surfaced by handlers or by the engine on a handler's behalf.
///
/// Each variant maps to a stable wire kind (see [`NodeError::kind`]) used in
/// run reports.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
  /// Malformed workflow structure or params; aborts the run before any
  /// handler executes.
  #[error("invalid workflow: {message}")]
  InvalidWorkflow { message: String },

  /// A required upstream or ambient value is absent.
  #[error("missing input: {message}")]
  MissingInput { message: String },

  /// A handler opted into strict template resolution and a token failed.
  #[error("unresolved template: {message}")]
  UnresolvedTemplate { message: String },

  /// Handler-reported failure with its own sub-kind (`auth`, `rate_limit`,
  /// `upstream_http`, `parse`, ...).
  #[error("handler error ({sub_kind}): {message}")]
  Handler { sub_kind: String, message: String },

  /// Per-node deadline exceeded.
  #[error("node timed out after {seconds}s")]
  Timeout { seconds: u64 },

  /// Run cancellation observed.
  #[error("node cancelled")]
  Cancelled,

  /// Skipped because every predecessor failed or was skipped.
  #[error("all predecessors failed or were skipped")]
  UpstreamFailed,
}

impl NodeError {
  /// Shorthand for a handler failure.
  pub fn handler(sub_kind: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Handler {
      sub_kind: sub_kind.into(),
      message: message.into(),
    }
  }

  /// The wire kind recorded in run reports.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::InvalidWorkflow { .. } => "invalid_workflow",
      Self::MissingInput { .. } => "missing_input",
      Self::UnresolvedTemplate { .. } => "unresolved_template",
      Self::Handler { .. } => "handler_error",
      Self::Timeout { .. } => "timeout",
      Self::Cancelled => "cancelled",
      Self::UpstreamFailed => "upstream_failed",
    }
  }
}
