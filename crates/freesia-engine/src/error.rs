use freesia_workflow::WorkflowError;
use thiserror::Error;

/// Errors that reject a run before any handler executes.
///
/// Everything else (handler failures, timeouts, skips) is recorded in the
/// run report instead of failing the `run` call.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("invalid workflow: {message}")]
  InvalidWorkflow { message: String },
}

impl From<WorkflowError> for EngineError {
  fn from(err: WorkflowError) -> Self {
    Self::InvalidWorkflow {
      message: err.to_string(),
    }
  }
}
