use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use freesia_node::{NodeRegistry, RunInputs};
use freesia_workflow::WorkflowDef;

use crate::error::EngineError;
use crate::events::{NoopNotifier, RunNotifier};
use crate::options::EngineOptions;
use crate::report::{NodeStatus, RunReport, RunSnapshot};
use crate::run::RunState;

/// The workflow execution engine.
///
/// Owns the handler registry and options; no process-wide state. Generic
/// over `N: RunNotifier` to allow different observation strategies - use
/// [`Engine::new`] for a default engine with no-op notifications.
pub struct Engine<N: RunNotifier = NoopNotifier> {
  registry: NodeRegistry,
  options: EngineOptions,
  notifier: N,
  runs: Mutex<HashMap<String, RunHandle>>,
}

/// Handle to a live run, kept for `cancel` and `status`.
struct RunHandle {
  cancel: CancellationToken,
  snapshot: Arc<Mutex<RunSnapshot>>,
}

impl Engine<NoopNotifier> {
  /// Create an engine that discards run events.
  pub fn new(registry: NodeRegistry, options: EngineOptions) -> Self {
    Self::with_notifier(registry, options, NoopNotifier)
  }
}

impl<N: RunNotifier> Engine<N> {
  /// Create an engine with a custom run-event notifier.
  pub fn with_notifier(registry: NodeRegistry, options: EngineOptions, notifier: N) -> Self {
    Self {
      registry,
      options,
      notifier,
      runs: Mutex::new(HashMap::new()),
    }
  }

  /// Register additional handlers (integrations, AI providers, stubs).
  pub fn registry_mut(&mut self) -> &mut NodeRegistry {
    &mut self.registry
  }

  /// Execute a workflow to completion.
  pub async fn run(
    &self,
    workflow: &WorkflowDef,
    inputs: RunInputs,
  ) -> Result<RunReport, EngineError> {
    self
      .run_with_cancel(workflow, inputs, CancellationToken::new())
      .await
  }

  /// Execute a workflow with an externally controlled cancellation token.
  ///
  /// Structural validation (duplicate ids, dangling edges, cycles, unknown
  /// node types) rejects the run before any handler executes; everything
  /// else lands in the report.
  pub async fn run_with_cancel(
    &self,
    workflow: &WorkflowDef,
    inputs: RunInputs,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    workflow.validate()?;
    let graph = workflow.graph();
    let order = graph.topological_order()?;

    for node in &workflow.nodes {
      if !self.registry.contains(&node.node_type) {
        return Err(EngineError::InvalidWorkflow {
          message: format!(
            "unknown node type '{}' for node '{}'",
            node.node_type, node.id
          ),
        });
      }
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let snapshot = Arc::new(Mutex::new(RunSnapshot {
      run_id: run_id.clone(),
      statuses: workflow
        .nodes
        .iter()
        .map(|node| (node.id.clone(), NodeStatus::Pending))
        .collect(),
    }));

    if let Ok(mut runs) = self.runs.lock() {
      runs.insert(
        run_id.clone(),
        RunHandle {
          cancel: cancel.clone(),
          snapshot: snapshot.clone(),
        },
      );
    }

    let state = RunState::new(
      workflow,
      graph,
      order,
      &self.registry,
      &self.options,
      &self.notifier,
      run_id.clone(),
      inputs,
      cancel,
      snapshot,
    );
    let report = state.execute().await;

    if let Ok(mut runs) = self.runs.lock() {
      runs.remove(&run_id);
    }

    Ok(report)
  }

  /// Cancel a live run. Returns false when the run is unknown or already
  /// finished.
  pub fn cancel(&self, run_id: &str) -> bool {
    let token = self
      .runs
      .lock()
      .ok()
      .and_then(|runs| runs.get(run_id).map(|handle| handle.cancel.clone()));
    match token {
      Some(token) => {
        token.cancel();
        true
      }
      None => false,
    }
  }

  /// Current per-node statuses of a live run.
  pub fn status(&self, run_id: &str) -> Option<RunSnapshot> {
    let snapshot = self
      .runs
      .lock()
      .ok()
      .and_then(|runs| runs.get(run_id).map(|handle| handle.snapshot.clone()))?;
    snapshot.lock().ok().map(|snapshot| snapshot.clone())
  }
}
