//! Flow execution engine.
//!
//! Each run is owned by a single driver task. The driver starts step
//! invocations as concurrent tasks, and every completion comes back to it.
//! Join decisions, state merges and event emission therefore all happen at
//! one serialized point, in the order completions are delivered.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use runnel_config::{DEFAULT_PORT, JoinMode};
use runnel_flow::{Flow, StepNode};
use runnel_state::{StateContainer, resolve};
use runnel_step::{
  Step, StepContext, StepError, StepFailure, StepOutcome, StepRunResult, StepStatus,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::EngineError;
use crate::events::{FlowEvent, FlowStatus, NoopNotifier, RunNotifier};
use crate::join::{JoinCoordinator, JoinDecision};
use crate::run::{FlowRun, RunOptions};

const ERROR_PORT: &str = "error";

/// The flow execution engine.
///
/// Generic over `N: RunNotifier` to allow different notification strategies.
/// Use `Engine::new()` for an engine with no-op notifications, or
/// `Engine::with_notifier()` to observe every run it starts. An engine can
/// start any number of concurrent runs of its flow; runs share nothing but
/// the flow and the notifier.
pub struct Engine<N: RunNotifier = NoopNotifier> {
  flow: Arc<Flow>,
  notifier: Arc<N>,
}

impl Engine<NoopNotifier> {
  pub fn new(flow: impl Into<Arc<Flow>>) -> Self {
    Self::with_notifier(flow, NoopNotifier)
  }
}

impl<N: RunNotifier + 'static> Engine<N> {
  pub fn with_notifier(flow: impl Into<Arc<Flow>>, notifier: N) -> Self {
    Self {
      flow: flow.into(),
      notifier: Arc::new(notifier),
    }
  }

  pub fn flow(&self) -> &Flow {
    &self.flow
  }

  /// The first trigger step of the flow, in definition order.
  pub fn default_trigger(&self) -> Result<&StepNode, EngineError> {
    self.flow.triggers().next().ok_or(EngineError::NoTrigger)
  }

  /// Start a run at `trigger_id` with empty state.
  pub fn run(&self, trigger_id: &str) -> Result<FlowRun, EngineError> {
    self.run_with(trigger_id, RunOptions::default())
  }

  /// Start a run at `trigger_id`.
  ///
  /// Nothing executes until the returned run is polled for events.
  pub fn run_with(&self, trigger_id: &str, options: RunOptions) -> Result<FlowRun, EngineError> {
    let trigger = self
      .flow
      .step(trigger_id)
      .ok_or_else(|| EngineError::UnknownStep {
        step_id: trigger_id.to_string(),
      })?;
    if !trigger.is_trigger() {
      return Err(EngineError::NotATrigger {
        step_id: trigger_id.to_string(),
      });
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let state = StateContainer::from_values(options.initial_state);
    for slot in options.slots {
      state.define(slot)?;
    }
    let state = Arc::new(state);
    let cancel = options.cancel.child_token();
    let (sender, receiver) = mpsc::unbounded_channel();

    let driver = Driver {
      flow: self.flow.clone(),
      notifier: self.notifier.clone(),
      run_id: run_id.clone(),
      state: state.clone(),
      cancel: cancel.clone(),
      events: sender,
      joins: JoinCoordinator::new(),
      tasks: JoinSet::new(),
      in_flight: HashMap::new(),
      queue: VecDeque::new(),
      skipped: HashSet::new(),
      failed: false,
    };

    Ok(FlowRun::new(
      run_id,
      self.flow.flow_id.clone(),
      state,
      receiver,
      driver.drive(trigger_id.to_string()).boxed(),
      cancel,
    ))
  }
}

/// Work waiting for the driver.
#[derive(Debug)]
enum Work {
  Start { step_id: String },
  Skip { step_id: String, reason: String },
}

/// A step invocation handed back to the driver.
struct Completion {
  step_id: String,
  invocation_id: String,
  outcome: Result<StepOutcome, StepError>,
  cancelled: bool,
  duration_ms: u64,
}

struct InFlight {
  step_id: String,
  cancel: CancellationToken,
}

/// Owns all mutable bookkeeping of one run.
struct Driver<N: RunNotifier> {
  flow: Arc<Flow>,
  notifier: Arc<N>,
  run_id: String,
  state: Arc<StateContainer>,
  cancel: CancellationToken,
  events: mpsc::UnboundedSender<FlowEvent>,
  joins: JoinCoordinator,
  tasks: JoinSet<Completion>,
  /// invocation_id -> running step.
  in_flight: HashMap<String, InFlight>,
  queue: VecDeque<Work>,
  /// Steps already recorded SKIPPED by propagation.
  skipped: HashSet<String>,
  failed: bool,
}

impl<N: RunNotifier + 'static> Driver<N> {
  #[instrument(
    name = "flow_run",
    skip(self, trigger_id),
    fields(run_id = %self.run_id, flow_id = %self.flow.flow_id)
  )]
  async fn drive(mut self, trigger_id: String) {
    info!(trigger = %trigger_id, "flow_started");
    self.emit(FlowEvent::FlowStarted {
      run_id: self.run_id.clone(),
      flow_id: self.flow.flow_id.clone(),
      flow_name: self.flow.name.clone(),
      timestamp: Utc::now(),
    });

    self.queue.push_back(Work::Start {
      step_id: trigger_id,
    });

    loop {
      if self.cancel.is_cancelled() && !self.queue.is_empty() {
        warn!(pending = self.queue.len(), "run cancelled, dropping pending steps");
        self.queue.clear();
      }

      while let Some(work) = self.queue.pop_front() {
        match work {
          Work::Start { step_id } => self.start(&step_id),
          Work::Skip { step_id, reason } => self.skip(&step_id, reason),
        }
      }

      if self.tasks.is_empty() {
        if self.cancel.is_cancelled() {
          break;
        }
        // One join at a time: its skip may complete joins further down.
        let Some(step_id) = self.next_stranded() else {
          break;
        };
        warn!(%step_id, "join stranded, inbound edges never arrived");
        self.joins.close(&step_id);
        self.queue.push_back(Work::Skip {
          step_id,
          reason: "inbound edges never arrived".to_string(),
        });
        continue;
      }

      match self.tasks.join_next().await {
        Some(Ok(completion)) => self.complete(completion),
        Some(Err(e)) => {
          // Panics are caught inside the task, so this is an aborted runtime.
          error!(error = %e, "step task did not complete");
          self.failed = true;
        }
        None => {}
      }
    }

    let status = if self.failed {
      FlowStatus::Failed
    } else if self.cancel.is_cancelled() {
      FlowStatus::Cancelled
    } else {
      FlowStatus::Succeeded
    };
    info!(%status, "flow_completed");
    self.emit(FlowEvent::FlowCompleted {
      run_id: self.run_id.clone(),
      flow_id: self.flow.flow_id.clone(),
      status,
      timestamp: Utc::now(),
    });
  }

  /// A partially arrived join with no other partial join upstream of it.
  ///
  /// Falls back to the first one when partial joins feed each other in a
  /// cycle.
  fn next_stranded(&self) -> Option<String> {
    let partial = self.joins.partial();
    partial
      .iter()
      .find(|candidate| {
        let ancestors = self.flow.ancestors(candidate);
        !partial
          .iter()
          .any(|other| other != *candidate && ancestors.contains(other))
      })
      .or_else(|| partial.first())
      .cloned()
  }

  fn emit(&self, event: FlowEvent) {
    self.notifier.notify(event.clone());
    // Ignore send errors - the run handle may have been dropped
    let _ = self.events.send(event);
  }

  /// Emit `StepStarted`, resolve config and spawn the invocation.
  fn start(&mut self, step_id: &str) {
    if self.cancel.is_cancelled() {
      return;
    }
    let Some(node) = self.flow.step(step_id) else {
      error!(%step_id, "step vanished from flow");
      return;
    };
    let node = node.clone();
    let invocation_id = uuid::Uuid::new_v4().to_string();

    self.emit(FlowEvent::StepStarted {
      run_id: self.run_id.clone(),
      flow_id: self.flow.flow_id.clone(),
      step_id: step_id.to_string(),
      step_type: node.step_type.clone(),
      invocation_id: invocation_id.clone(),
      timestamp: Utc::now(),
    });

    let config = match resolve(&node.config, &self.state) {
      Ok(config) => config,
      Err(e) => {
        self.complete(Completion {
          step_id: step_id.to_string(),
          invocation_id,
          outcome: Ok(StepOutcome::failure(e.to_string()).with_code("resolution_error")),
          cancelled: false,
          duration_ms: 0,
        });
        return;
      }
    };

    let cancel = self.cancel.child_token();
    let ctx = StepContext {
      run_id: self.run_id.clone(),
      flow_id: self.flow.flow_id.clone(),
      step_id: step_id.to_string(),
      invocation_id: invocation_id.clone(),
      state: self.state.clone(),
      cancel: cancel.clone(),
    };
    self.in_flight.insert(
      invocation_id,
      InFlight {
        step_id: step_id.to_string(),
        cancel,
      },
    );
    self.tasks.spawn(invoke(node.step().clone(), ctx, config));
  }

  /// Record a finished invocation and route its result.
  fn complete(&mut self, completion: Completion) {
    self.in_flight.remove(&completion.invocation_id);
    let Some(node) = self.flow.step(&completion.step_id) else {
      return;
    };
    let node = node.clone();
    let result = self.record(&node, completion.invocation_id, completion.outcome, completion.cancelled);

    match result.status {
      StepStatus::Succeeded => {
        info!(step_id = %result.step_id, duration_ms = completion.duration_ms, "step succeeded")
      }
      StepStatus::Failed => {
        self.failed = true;
        error!(
          step_id = %result.step_id,
          error = result.error_message().unwrap_or_default(),
          "step failed"
        );
      }
      StepStatus::Skipped => warn!(
        step_id = %result.step_id,
        reason = result.skip_reason.as_deref().unwrap_or_default(),
        "step skipped"
      ),
    }

    let status = result.status;
    let ports = result.ports.clone();
    let detached = result.continue_without_waiting;
    self.emit(FlowEvent::StepCompleted {
      run_id: self.run_id.clone(),
      flow_id: self.flow.flow_id.clone(),
      step_id: node.step_id.clone(),
      result,
      duration_ms: completion.duration_ms,
      state_snapshot: self.state.snapshot(),
      timestamp: Utc::now(),
    });

    if detached {
      debug!(step_id = %node.step_id, "fire and forget, not routing");
    } else if !self.cancel.is_cancelled() {
      self.propagate(&node.step_id, status, &ports);
    }
  }

  /// Turn a step's outcome into its run result, merging output into state.
  fn record(
    &self,
    node: &StepNode,
    invocation_id: String,
    outcome: Result<StepOutcome, StepError>,
    cancelled: bool,
  ) -> StepRunResult {
    let outcome = match outcome {
      _ if cancelled => {
        return StepRunResult::skipped(&node.step_id, invocation_id, node.ports().to_vec(), "cancelled");
      }
      Ok(outcome) => outcome,
      Err(StepError::Cancelled) => {
        return StepRunResult::skipped(&node.step_id, invocation_id, node.ports().to_vec(), "cancelled");
      }
      Err(e) => StepOutcome::failure(e.to_string()).with_code(e.code()),
    };

    let mut result = StepRunResult {
      step_id: node.step_id.clone(),
      invocation_id,
      status: outcome.status,
      ports: outcome.ports,
      output: outcome.output,
      error: outcome.error,
      skip_reason: None,
      continue_without_waiting: outcome.continue_without_waiting,
    };

    let undeclared: Vec<&str> = result
      .ports
      .iter()
      .filter(|p| !node.has_port(p))
      .map(String::as_str)
      .collect();
    if !undeclared.is_empty() && result.status != StepStatus::Skipped {
      let message = format!(
        "step reported undeclared port(s) {} (declared: {})",
        undeclared.join(", "),
        node.ports().join(", ")
      );
      result.status = StepStatus::Failed;
      result.ports = Vec::new();
      result.error = Some(StepFailure {
        message,
        code: Some("invalid_port".to_string()),
        details: None,
      });
    }

    if result.status == StepStatus::Succeeded {
      if let Some(Value::Object(output)) = &result.output {
        if let Err(e) = self.state.merge(output.clone()) {
          result.status = StepStatus::Failed;
          result.ports = Vec::new();
          result.error = Some(StepFailure {
            message: format!("failed to write output to state: {}", e),
            code: Some("state_error".to_string()),
            details: None,
          });
        }
      }
    }

    match result.status {
      StepStatus::Succeeded if result.ports.is_empty() => {
        result.ports = vec![DEFAULT_PORT.to_string()];
      }
      StepStatus::Failed if result.ports.is_empty() => {
        result.ports = vec![failure_port(node).to_string()];
      }
      StepStatus::Skipped => {
        result.ports = node.ports().to_vec();
        result.skip_reason = Some("skipped by step".to_string());
      }
      _ => {}
    }
    result
  }

  /// Record a step SKIPPED without running it, then propagate.
  fn skip(&mut self, step_id: &str, reason: String) {
    if !self.skipped.insert(step_id.to_string()) {
      debug!(%step_id, "step already skipped");
      return;
    }
    let Some(node) = self.flow.step(step_id) else {
      return;
    };
    let ports = node.ports().to_vec();
    let result = StepRunResult::skipped(
      step_id,
      uuid::Uuid::new_v4().to_string(),
      ports.clone(),
      reason.clone(),
    );
    warn!(%step_id, %reason, "step skipped");
    self.emit(FlowEvent::StepCompleted {
      run_id: self.run_id.clone(),
      flow_id: self.flow.flow_id.clone(),
      step_id: step_id.to_string(),
      result,
      duration_ms: 0,
      state_snapshot: self.state.snapshot(),
      timestamp: Utc::now(),
    });
    self.propagate(step_id, StepStatus::Skipped, &ports);
  }

  /// Deliver arrivals along every edge leaving an activated port.
  fn propagate(&mut self, source: &str, status: StepStatus, ports: &[String]) {
    let flow = self.flow.clone();
    let graph = flow.graph();

    for edge in graph.outgoing(source) {
      if !ports.contains(&edge.source_port) {
        continue;
      }
      let Some(target) = flow.step(&edge.target) else {
        continue;
      };
      let decision = self.joins.arrive(
        &edge.target,
        target.join_mode,
        graph.in_degree(&edge.target),
        source,
        status,
      );

      match decision {
        JoinDecision::Run => {
          if target.join_mode == JoinMode::FirstSuccess {
            self.cancel_losers(&flow, &edge.target, source);
          }
          self.queue.push_back(Work::Start {
            step_id: edge.target.clone(),
          });
        }
        JoinDecision::Skip(reason) => self.queue.push_back(Work::Skip {
          step_id: edge.target.clone(),
          reason,
        }),
        JoinDecision::Wait | JoinDecision::Ignore => {}
      }
    }
  }

  /// Cancel in-flight branches feeding `target` that did not win its
  /// FIRST_SUCCESS join.
  fn cancel_losers(&self, flow: &Flow, target: &str, winner: &str) {
    let feeding = flow.ancestors(target);
    let winning = flow.ancestors(winner);
    for running in self.in_flight.values() {
      let id = running.step_id.as_str();
      if id != target && id != winner && feeding.contains(id) && !winning.contains(id) {
        debug!(step_id = %id, %target, %winner, "cancelling losing branch");
        running.cancel.cancel();
      }
    }
  }
}

fn failure_port(node: &StepNode) -> &str {
  if node.has_port(ERROR_PORT) {
    ERROR_PORT
  } else {
    DEFAULT_PORT
  }
}

/// Run one invocation, catching panics.
async fn invoke(step: Arc<dyn Step>, ctx: StepContext, config: Value) -> Completion {
  let started = Instant::now();
  let outcome = match AssertUnwindSafe(step.run(&ctx, config)).catch_unwind().await {
    Ok(outcome) => outcome,
    Err(panic) => {
      let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
      Ok(StepOutcome::failure(format!("step panicked: {}", message)).with_code("panic"))
    }
  };

  Completion {
    step_id: ctx.step_id,
    invocation_id: ctx.invocation_id,
    outcome,
    cancelled: ctx.cancel.is_cancelled(),
    duration_ms: started.elapsed().as_millis() as u64,
  }
}
