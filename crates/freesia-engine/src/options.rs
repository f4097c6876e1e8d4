use std::time::Duration;

use freesia_node::HandlerKind;

/// Run-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
  /// Concurrency cap for CPU-bound built-in handlers. I/O-bound AI and
  /// integration handlers are not counted against this limit.
  pub max_in_flight: usize,
  /// Deadline for AI handlers.
  pub ai_timeout: Option<Duration>,
  /// Deadline for integration handlers.
  pub integration_timeout: Option<Duration>,
  /// Deadline for built-in handlers.
  pub builtin_timeout: Option<Duration>,
  /// How long to wait for in-flight handlers after cancellation. `None`
  /// waits until they observe the token and return.
  pub cancel_grace: Option<Duration>,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      max_in_flight: num_cpus::get().max(1),
      ai_timeout: Some(Duration::from_secs(120)),
      integration_timeout: Some(Duration::from_secs(60)),
      builtin_timeout: None,
      cancel_grace: None,
    }
  }
}

impl EngineOptions {
  /// The deadline applied to a handler of the given kind.
  pub fn timeout_for(&self, kind: HandlerKind) -> Option<Duration> {
    match kind {
      HandlerKind::Builtin => self.builtin_timeout,
      HandlerKind::Ai => self.ai_timeout,
      HandlerKind::Integration => self.integration_timeout,
    }
  }
}
