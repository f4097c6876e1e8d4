//! Run coordination: the single owner of the output table and status map.
//!
//! Execution proceeds in batches of ready nodes. A node is ready once every
//! predecessor is terminal; it is skipped, without running, once every
//! incoming edge is dead (source failed/skipped, or a condition branch not
//! taken). Failures never abort the run: independent branches keep
//! executing and the report records per-node outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use freesia_node::{
  HandlerKind, IoKind, NodeContext, NodeError, NodeOutput, NodeRegistry, OutputMap, RunInputs,
};
use freesia_workflow::{Graph, IncomingEdge, WorkflowDef};

use crate::assembler::{AmbientInputs, assemble};
use crate::events::{RunEvent, RunNotifier};
use crate::options::EngineOptions;
use crate::report::{ErrorInfo, NodeResultEntry, NodeStatus, RunReport, RunSnapshot, RunStatus};

const SKIP_UPSTREAM_FAILED: &str = "upstream_failed";
const SKIP_CONDITION: &str = "condition_skipped";

/// State for one run. Only this struct writes the output table, statuses,
/// and execution path; handlers see a read-only snapshot per batch.
pub(crate) struct RunState<'a, N: RunNotifier> {
  workflow: &'a WorkflowDef,
  graph: Graph,
  order: Vec<String>,
  registry: &'a NodeRegistry,
  options: &'a EngineOptions,
  notifier: &'a N,
  run_id: String,
  run_inputs: RunInputs,
  cancel: CancellationToken,
  outputs: OutputMap,
  results: HashMap<String, NodeResultEntry>,
  execution_path: Vec<String>,
  snapshot: Arc<Mutex<RunSnapshot>>,
}

struct NodeOutcome {
  node_id: String,
  result: Result<Value, NodeError>,
  elapsed: f64,
}

/// State of one incoming edge as seen by the skip policy.
enum EdgeState {
  Live,
  /// Source not yet terminal.
  Undetermined,
  DeadFailure,
  DeadCondition,
}

impl<'a, N: RunNotifier> RunState<'a, N> {
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    workflow: &'a WorkflowDef,
    graph: Graph,
    order: Vec<String>,
    registry: &'a NodeRegistry,
    options: &'a EngineOptions,
    notifier: &'a N,
    run_id: String,
    run_inputs: RunInputs,
    cancel: CancellationToken,
    snapshot: Arc<Mutex<RunSnapshot>>,
  ) -> Self {
    let results = workflow
      .nodes
      .iter()
      .map(|node| (node.id.clone(), NodeResultEntry::pending()))
      .collect();

    Self {
      workflow,
      graph,
      order,
      registry,
      options,
      notifier,
      run_id,
      run_inputs,
      cancel,
      outputs: OutputMap::new(),
      results,
      execution_path: Vec::new(),
      snapshot,
    }
  }

  /// Drive the run to a terminal state and produce the report.
  #[instrument(name = "run_execute", skip(self), fields(run_id = %self.run_id))]
  pub(crate) async fn execute(mut self) -> RunReport {
    let started = Instant::now();

    info!(
      run_id = %self.run_id,
      nodes = self.workflow.nodes.len(),
      "run_started"
    );
    self.notifier.notify(RunEvent::RunStarted {
      run_id: self.run_id.clone(),
    });

    // Seed input nodes eagerly so templates against them resolve before any
    // first-batch handler runs.
    self.seed_inputs().await;

    let semaphore = Arc::new(Semaphore::new(self.options.max_in_flight));

    loop {
      if self.cancel.is_cancelled() {
        break;
      }

      self.propagate_skips();

      let ready = self.ready_nodes();
      if ready.is_empty() {
        break;
      }

      info!(
        run_id = %self.run_id,
        ready_nodes = ?ready,
        "executing batch of ready nodes"
      );

      let handles = self.spawn_batch(&ready, &semaphore);
      let mut batch = join_all(handles);

      let results = tokio::select! {
        results = &mut batch => results,
        _ = self.cancel.cancelled() => {
          warn!(run_id = %self.run_id, "run cancelled, draining in-flight nodes");
          match self.options.cancel_grace {
            Some(grace) => tokio::time::timeout(grace, &mut batch)
              .await
              .unwrap_or_default(),
            None => batch.await,
          }
        }
      };

      for (node_id, joined) in ready.iter().zip(results) {
        let outcome = joined.unwrap_or_else(|err| NodeOutcome {
          node_id: node_id.clone(),
          result: Err(NodeError::handler(
            "panic",
            format!("node task aborted: {}", err),
          )),
          elapsed: 0.0,
        });
        self.record(outcome, None);
      }
    }

    let cancelled = self.cancel.is_cancelled();
    if cancelled {
      self.fail_unfinished();
    }

    self.finish(started, cancelled)
  }

  /// Execute input-typed nodes up front, in declaration order.
  async fn seed_inputs(&mut self) {
    let input_nodes: Vec<String> = self
      .workflow
      .nodes
      .iter()
      .filter(|node| node.node_type == "input")
      .map(|node| node.id.clone())
      .collect();

    for (index, node_id) in input_nodes.iter().enumerate() {
      if self.cancel.is_cancelled() {
        return;
      }

      let Some(node) = self.workflow.get_node(node_id).cloned() else {
        continue;
      };
      let Some(handler) = self.registry.get(&node.node_type) else {
        continue;
      };

      let assembled = assemble(
        &node,
        self.graph.incoming(node_id),
        &self.outputs,
        Some(AmbientInputs {
          run_inputs: &self.run_inputs,
          index,
        }),
      );
      let io_kind = assembled.io_kind.or(Some(IoKind::Text));
      self.stash_warnings(node_id, assembled.warnings);

      self.set_status(node_id, NodeStatus::Running);
      self.notifier.notify(RunEvent::NodeStarted {
        run_id: self.run_id.clone(),
        node_id: node_id.clone(),
      });

      let ctx = self.context_for(&node.id, node.node_name());
      let timer = Instant::now();
      let result = handler.execute(&ctx, &assembled.params, &assembled.inputs).await;

      self.record(
        NodeOutcome {
          node_id: node_id.clone(),
          result,
          elapsed: timer.elapsed().as_secs_f64(),
        },
        io_kind,
      );
    }
  }

  /// Nodes whose predecessors are all terminal and that were not skipped.
  fn ready_nodes(&self) -> Vec<String> {
    self
      .order
      .iter()
      .filter(|id| self.status(id) == NodeStatus::Pending)
      .filter(|id| {
        self
          .graph
          .upstream(id)
          .iter()
          .all(|up| self.status(up).is_terminal())
      })
      .cloned()
      .collect()
  }

  /// Spawn one task per ready node. Built-ins contend for the semaphore;
  /// AI/integration handlers run unbounded and under their kind's deadline.
  fn spawn_batch(
    &mut self,
    ready: &[String],
    semaphore: &Arc<Semaphore>,
  ) -> Vec<JoinHandle<NodeOutcome>> {
    let snapshot = Arc::new(self.outputs.clone());
    let mut handles = Vec::with_capacity(ready.len());

    for node_id in ready {
      let node = self.workflow.get_node(node_id).unwrap().clone();

      // Dead edges (failed sources, unchosen condition branches) contribute
      // no input even when the node still runs via another live path.
      let incoming: Vec<IncomingEdge> = self
        .graph
        .incoming(node_id)
        .iter()
        .filter(|edge| matches!(self.edge_state(edge), EdgeState::Live))
        .cloned()
        .collect();
      let assembled = assemble(&node, &incoming, &self.outputs, None);
      self.stash_warnings(node_id, assembled.warnings);
      self.set_status(node_id, NodeStatus::Ready);

      let handler = self.registry.get(&node.node_type);
      let ctx = NodeContext {
        run_id: self.run_id.clone(),
        node_id: node_id.clone(),
        node_name: node.node_name().to_string(),
        outputs: snapshot.clone(),
        cancel: self.cancel.clone(),
      };

      self.set_status(node_id, NodeStatus::Running);
      self.notifier.notify(RunEvent::NodeStarted {
        run_id: self.run_id.clone(),
        node_id: node_id.clone(),
      });
      info!(
        run_id = %self.run_id,
        node_id = %node_id,
        node_type = %node.node_type,
        "node_started"
      );

      let id = node_id.clone();
      let node_type = node.node_type.clone();
      let options = self.options.clone();
      let semaphore = semaphore.clone();
      let params = assembled.params;
      let inputs = assembled.inputs;

      handles.push(tokio::spawn(async move {
        let Some(handler) = handler else {
          return NodeOutcome {
            node_id: id,
            result: Err(NodeError::InvalidWorkflow {
              message: format!("unknown node type '{}'", node_type),
            }),
            elapsed: 0.0,
          };
        };

        let _permit = if handler.kind() == HandlerKind::Builtin {
          semaphore.acquire_owned().await.ok()
        } else {
          None
        };

        let timer = Instant::now();
        let result = match options.timeout_for(handler.kind()) {
          Some(deadline) => {
            match tokio::time::timeout(deadline, handler.execute(&ctx, &params, &inputs)).await {
              Ok(result) => result,
              Err(_) => Err(NodeError::Timeout {
                seconds: deadline.as_secs(),
              }),
            }
          }
          None => handler.execute(&ctx, &params, &inputs).await,
        };

        NodeOutcome {
          node_id: id,
          result,
          elapsed: timer.elapsed().as_secs_f64(),
        }
      }));
    }

    handles
  }

  /// Publish one node outcome: normalize and write the output, transition
  /// the status, extend the execution path.
  fn record(&mut self, outcome: NodeOutcome, io_kind: Option<IoKind>) {
    let NodeOutcome {
      node_id,
      result,
      elapsed,
    } = outcome;

    if let Some(entry) = self.results.get_mut(&node_id) {
      entry.execution_time = elapsed;
    }

    match result {
      Ok(value) => {
        let Some(node) = self.workflow.get_node(&node_id) else {
          return;
        };
        let record =
          NodeOutput::normalize(value, &node.node_type, node.node_name(), io_kind).into_value();

        info!(
          run_id = %self.run_id,
          node_id = %node_id,
          "node_completed"
        );
        self.notifier.notify(RunEvent::NodeCompleted {
          run_id: self.run_id.clone(),
          node_id: node_id.clone(),
          output: record.clone(),
        });

        self.outputs.insert(node_id.clone(), record);
        self.set_status(&node_id, NodeStatus::Completed);
        self.execution_path.push(node_id);
      }
      Err(err) => {
        error!(
          run_id = %self.run_id,
          node_id = %node_id,
          error = %err,
          "node_failed"
        );
        self.notifier.notify(RunEvent::NodeFailed {
          run_id: self.run_id.clone(),
          node_id: node_id.clone(),
          error: err.to_string(),
        });

        if let Some(entry) = self.results.get_mut(&node_id) {
          entry.error = Some(ErrorInfo::from(&err));
        }
        self.set_status(&node_id, NodeStatus::Failed);
      }
    }
  }

  /// Mark nodes whose incoming edges are all dead, repeating until no new
  /// skip appears (skips make further edges dead).
  fn propagate_skips(&mut self) {
    loop {
      let mut skips: Vec<(String, &'static str)> = Vec::new();

      for node_id in &self.order {
        if self.status(node_id) != NodeStatus::Pending {
          continue;
        }
        let incoming = self.graph.incoming(node_id);
        if incoming.is_empty() {
          continue;
        }

        let mut all_dead = true;
        let mut any_failure = false;
        for edge in incoming {
          match self.edge_state(edge) {
            EdgeState::Live | EdgeState::Undetermined => {
              all_dead = false;
              break;
            }
            EdgeState::DeadFailure => any_failure = true,
            EdgeState::DeadCondition => {}
          }
        }

        if all_dead {
          let reason = if any_failure {
            SKIP_UPSTREAM_FAILED
          } else {
            SKIP_CONDITION
          };
          skips.push((node_id.clone(), reason));
        }
      }

      if skips.is_empty() {
        return;
      }
      for (node_id, reason) in skips {
        self.mark_skipped(&node_id, reason);
      }
    }
  }

  fn edge_state(&self, edge: &IncomingEdge) -> EdgeState {
    match self.status(&edge.source) {
      NodeStatus::Failed => EdgeState::DeadFailure,
      NodeStatus::Skipped => {
        let reason = self
          .results
          .get(&edge.source)
          .and_then(|entry| entry.skip_reason.as_deref());
        if reason == Some(SKIP_CONDITION) {
          EdgeState::DeadCondition
        } else {
          EdgeState::DeadFailure
        }
      }
      NodeStatus::Completed => self.condition_edge_state(edge),
      _ => EdgeState::Undetermined,
    }
  }

  /// An edge out of a completed condition node is live only when its source
  /// handle names the matched path; a no-match condition kills every
  /// outgoing edge.
  fn condition_edge_state(&self, edge: &IncomingEdge) -> EdgeState {
    let is_condition = self
      .workflow
      .get_node(&edge.source)
      .is_some_and(|node| node.node_type == "condition");
    if !is_condition {
      return EdgeState::Live;
    }

    match self
      .outputs
      .get(&edge.source)
      .and_then(|record| record.get("matched_path"))
    {
      Some(Value::String(matched)) => match &edge.source_handle {
        Some(handle) if handle != matched => EdgeState::DeadCondition,
        _ => EdgeState::Live,
      },
      Some(Value::Null) => EdgeState::DeadCondition,
      _ => EdgeState::Live,
    }
  }

  fn mark_skipped(&mut self, node_id: &str, reason: &'static str) {
    info!(
      run_id = %self.run_id,
      node_id = %node_id,
      reason = %reason,
      "node_skipped"
    );
    self.notifier.notify(RunEvent::NodeSkipped {
      run_id: self.run_id.clone(),
      node_id: node_id.to_string(),
      reason: reason.to_string(),
    });

    if let Some(entry) = self.results.get_mut(node_id) {
      entry.skip_reason = Some(reason.to_string());
      if reason == SKIP_UPSTREAM_FAILED {
        entry.error = Some(ErrorInfo::from(&NodeError::UpstreamFailed));
      }
    }
    self.set_status(node_id, NodeStatus::Skipped);
  }

  /// After cancellation, nothing may remain in-flight in the report.
  fn fail_unfinished(&mut self) {
    let unfinished: Vec<String> = self
      .order
      .iter()
      .filter(|id| matches!(self.status(id), NodeStatus::Ready | NodeStatus::Running))
      .cloned()
      .collect();

    for node_id in unfinished {
      if let Some(entry) = self.results.get_mut(&node_id) {
        entry.error = Some(ErrorInfo::from(&NodeError::Cancelled));
      }
      self.set_status(&node_id, NodeStatus::Failed);
    }
  }

  fn finish(self, started: Instant, cancelled: bool) -> RunReport {
    let status = if cancelled {
      RunStatus::Cancelled
    } else {
      self.overall_status()
    };

    info!(
      run_id = %self.run_id,
      status = ?status,
      nodes_completed = self.execution_path.len(),
      "run_finished"
    );
    self.notifier.notify(RunEvent::RunFinished {
      run_id: self.run_id.clone(),
      status,
    });

    RunReport {
      run_id: self.run_id,
      status,
      outputs: self.outputs,
      node_results: self.results,
      execution_path: self.execution_path,
      execution_time: started.elapsed().as_secs_f64(),
    }
  }

  /// Overall status: condition skips are intentional and do not degrade a
  /// run; anything else does. A degraded run is `partial` only when some
  /// terminal node still produced output.
  fn overall_status(&self) -> RunStatus {
    let degraded = self.results.values().any(|entry| {
      !matches!(entry.status, NodeStatus::Completed)
        && entry.skip_reason.as_deref() != Some(SKIP_CONDITION)
    });
    if !degraded {
      return RunStatus::Completed;
    }

    let any_sink_completed = self.order.iter().any(|id| {
      self.graph.downstream(id).is_empty() && self.status(id) == NodeStatus::Completed
    });
    if any_sink_completed {
      RunStatus::Partial
    } else {
      RunStatus::Failed
    }
  }

  fn status(&self, node_id: &str) -> NodeStatus {
    self
      .results
      .get(node_id)
      .map(|entry| entry.status)
      .unwrap_or(NodeStatus::Pending)
  }

  fn set_status(&mut self, node_id: &str, status: NodeStatus) {
    if let Some(entry) = self.results.get_mut(node_id) {
      entry.status = status;
    }
    if let Ok(mut snapshot) = self.snapshot.lock() {
      snapshot.statuses.insert(node_id.to_string(), status);
    }
  }

  fn stash_warnings(&mut self, node_id: &str, warnings: Vec<freesia_template::TemplateWarning>) {
    if warnings.is_empty() {
      return;
    }
    for warning in &warnings {
      warn!(
        run_id = %self.run_id,
        node_id = %node_id,
        token = %warning.token,
        reason = %warning.reason,
        "unresolved_template"
      );
    }
    if let Some(entry) = self.results.get_mut(node_id) {
      entry.warnings = warnings;
    }
  }

  fn context_for(&self, node_id: &str, node_name: &str) -> NodeContext {
    NodeContext {
      run_id: self.run_id.clone(),
      node_id: node_id.to_string(),
      node_name: node_name.to_string(),
      outputs: Arc::new(self.outputs.clone()),
      cancel: self.cancel.clone(),
    }
  }
}
