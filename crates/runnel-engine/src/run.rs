//! Handles for a single flow run.

use std::sync::Arc;

use futures::Stream;
use futures::future::BoxFuture;
use runnel_state::{StateContainer, StateSlot};
use runnel_step::StepRunResult;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::events::{FlowEvent, FlowStatus};

/// Options for starting a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  /// Top-level entries the run's state starts with, usually produced by
  /// the trigger.
  pub initial_state: Map<String, Value>,
  /// Typed top-level keys, declared before the first step runs. Initial
  /// values they name are cast to their type.
  pub slots: Vec<StateSlot>,
  /// Cancels the whole run. Steps in flight end SKIPPED and no new step
  /// starts.
  pub cancel: CancellationToken,
}

impl RunOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_state(mut self, initial_state: Map<String, Value>) -> Self {
    self.initial_state = initial_state;
    self
  }

  pub fn with_slots(mut self, slots: Vec<StateSlot>) -> Self {
    self.slots = slots;
    self
  }

  pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }
}

/// A started flow run.
///
/// The run is driven lazily: its driver task is spawned the first time an
/// event is requested. Events are yielded once, in order, ending with
/// `FlowCompleted`. Dropping the handle cancels the run.
pub struct FlowRun {
  run_id: String,
  flow_id: String,
  state: Arc<StateContainer>,
  events: mpsc::UnboundedReceiver<FlowEvent>,
  driver: Option<BoxFuture<'static, ()>>,
  finished: bool,
  _guard: DropGuard,
}

impl FlowRun {
  pub(crate) fn new(
    run_id: String,
    flow_id: String,
    state: Arc<StateContainer>,
    events: mpsc::UnboundedReceiver<FlowEvent>,
    driver: BoxFuture<'static, ()>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      run_id,
      flow_id,
      state,
      events,
      driver: Some(driver),
      finished: false,
      _guard: cancel.drop_guard(),
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn flow_id(&self) -> &str {
    &self.flow_id
  }

  /// The run's shared state. Reads reflect every write made so far.
  pub fn state(&self) -> &Arc<StateContainer> {
    &self.state
  }

  /// Next event of the run, or `None` once `FlowCompleted` was returned.
  pub async fn next_event(&mut self) -> Option<FlowEvent> {
    if self.finished {
      return None;
    }
    if let Some(driver) = self.driver.take() {
      tokio::spawn(driver);
    }

    let event = self.events.recv().await;
    match &event {
      Some(event) if event.is_terminal() => self.finished = true,
      None => self.finished = true,
      _ => {}
    }
    event
  }

  /// Consume the run as a stream of events.
  pub fn into_stream(self) -> impl Stream<Item = FlowEvent> + Send {
    futures::stream::unfold(self, |mut run| async move {
      let event = run.next_event().await?;
      Some((event, run))
    })
  }

  /// Drive the run to completion and collect what happened.
  pub async fn wait(mut self) -> RunReport {
    let mut events = Vec::new();
    let mut results = Vec::new();
    // A driver that never reports completion counts as failed.
    let mut status = FlowStatus::Failed;

    while let Some(event) = self.next_event().await {
      match &event {
        FlowEvent::StepCompleted { result, .. } => results.push(result.clone()),
        FlowEvent::FlowCompleted { status: s, .. } => status = *s,
        _ => {}
      }
      events.push(event);
    }

    RunReport {
      run_id: self.run_id.clone(),
      status,
      results,
      events,
      state: self.state.snapshot(),
    }
  }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id: String,
  pub status: FlowStatus,
  /// Results in completion order. NO_WAIT steps may appear more than once.
  pub results: Vec<StepRunResult>,
  pub events: Vec<FlowEvent>,
  /// Final state of the run.
  pub state: Map<String, Value>,
}

impl RunReport {
  /// Every result recorded for `step_id`.
  pub fn results_for<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a StepRunResult> {
    self.results.iter().filter(move |r| r.step_id == step_id)
  }

  /// The last result recorded for `step_id`.
  pub fn result(&self, step_id: &str) -> Option<&StepRunResult> {
    self.results.iter().rev().find(|r| r.step_id == step_id)
  }

  /// Number of times `step_id` was actually invoked.
  pub fn invocations(&self, step_id: &str) -> usize {
    self
      .events
      .iter()
      .filter(|e| matches!(e, FlowEvent::StepStarted { step_id: s, .. } if s == step_id))
      .count()
  }
}
