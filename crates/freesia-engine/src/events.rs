//! Run events and notifiers for observability.
//!
//! Events are emitted during workflow execution to allow consumers to
//! observe progress, persist state, stream to UIs, etc.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::report::RunStatus;

/// Events emitted during a workflow run.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
  RunStarted {
    run_id: String,
  },

  NodeStarted {
    run_id: String,
    node_id: String,
  },

  NodeCompleted {
    run_id: String,
    node_id: String,
    output: Value,
  },

  NodeFailed {
    run_id: String,
    node_id: String,
    error: String,
  },

  NodeSkipped {
    run_id: String,
    node_id: String,
    reason: String,
  },

  RunFinished {
    run_id: String,
    status: RunStatus,
  },
}

/// Trait for receiving run events.
///
/// The engine calls `notify` for each event - implementations decide what to
/// do with them (persist, broadcast, log, ignore, etc.).
pub trait RunNotifier: Send + Sync {
  fn notify(&self, event: RunEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RunNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls the engine; event volume is a
/// handful per node, so growth stays small in practice.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }
}

impl RunNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
