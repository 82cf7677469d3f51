#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use runnel_config::JoinMode;
use runnel_engine::{FlowEvent, RunReport};
use runnel_flow::{Flow, StepNode};
use runnel_step::{Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome};
use runnel_steps::builtin_registry;
use serde_json::{Value, json};

/// Trigger that starts every test flow.
pub struct Start;

#[async_trait]
impl Step for Start {
  fn info(&self) -> StepInfo {
    StepInfo::new("Start", "Test trigger", StepCategory::Trigger)
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(json!({})))
  }
}

/// Succeeds with a fixed output.
pub struct Emit(pub Value);

#[async_trait]
impl Step for Emit {
  fn info(&self) -> StepInfo {
    StepInfo::new("Emit", "Emit a fixed output", StepCategory::Utility)
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(self.0.clone()))
  }
}

/// Always returns an error.
pub struct Fail;

#[async_trait]
impl Step for Fail {
  fn info(&self) -> StepInfo {
    StepInfo::new("Fail", "Always fails", StepCategory::Utility)
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Err(StepError::execution("boom"))
  }
}

/// Fails through a dedicated `error` port.
pub struct FailWithPort;

#[async_trait]
impl Step for FailWithPort {
  fn info(&self) -> StepInfo {
    StepInfo::new("Fail with port", "Fails through error", StepCategory::Integration)
  }

  fn ports(&self) -> Vec<String> {
    vec!["default".to_string(), "error".to_string()]
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Err(StepError::execution("upstream unavailable"))
  }
}

pub struct Panics;

#[async_trait]
impl Step for Panics {
  fn info(&self) -> StepInfo {
    StepInfo::new("Panics", "Panics when run", StepCategory::Utility)
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    panic!("kaboom")
  }
}

/// Sleeps unless cancelled first.
pub struct Slow(pub Duration);

#[async_trait]
impl Step for Slow {
  fn info(&self) -> StepInfo {
    StepInfo::new("Slow", "Sleeps", StepCategory::Utility)
  }

  async fn run(&self, ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    tokio::select! {
      _ = tokio::time::sleep(self.0) => Ok(StepOutcome::success(json!({}))),
      _ = ctx.cancel.cancelled() => Err(StepError::Cancelled),
    }
  }
}

/// Returns a fixed outcome through a configurable set of ports.
pub struct Fixed {
  outcome: StepOutcome,
  ports: Vec<String>,
}

impl Fixed {
  pub fn new(outcome: StepOutcome) -> Self {
    Self {
      outcome,
      ports: vec!["default".to_string()],
    }
  }

  pub fn ports(mut self, ports: &[&str]) -> Self {
    self.ports = ports.iter().map(|p| p.to_string()).collect();
    self
  }
}

#[async_trait]
impl Step for Fixed {
  fn info(&self) -> StepInfo {
    StepInfo::new("Fixed", "Returns a fixed outcome", StepCategory::Utility)
  }

  fn ports(&self) -> Vec<String> {
    self.ports.clone()
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(self.outcome.clone())
  }
}

/// Counts its invocations.
#[derive(Clone, Default)]
pub struct Counter(pub Arc<AtomicUsize>);

impl Counter {
  pub fn count(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Step for Counter {
  fn info(&self) -> StepInfo {
    StepInfo::new("Counter", "Counts invocations", StepCategory::Utility)
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    self.0.fetch_add(1, Ordering::SeqCst);
    Ok(StepOutcome::success(json!({})))
  }
}

/// Builds test flows rooted at a `start` trigger.
pub struct FlowBuilder {
  flow: Flow,
}

impl FlowBuilder {
  pub fn new() -> Self {
    let mut flow = Flow::new("test-flow", "Test Flow");
    flow
      .add_step(StepNode::new("start", "test_start", Arc::new(Start), json!({})))
      .unwrap();
    Self { flow }
  }

  pub fn step(self, step_id: &str, step: impl Step + 'static) -> Self {
    self.join(step_id, step, JoinMode::NoWait)
  }

  pub fn join(mut self, step_id: &str, step: impl Step + 'static, mode: JoinMode) -> Self {
    let node = StepNode::new(step_id, "test", Arc::new(step), json!({})).with_join_mode(mode);
    self.flow.add_step(node).unwrap();
    self
  }

  /// Add a built-in step by type tag.
  pub fn builtin(self, step_id: &str, tag: &str, config: Value) -> Self {
    self.builtin_join(step_id, tag, config, JoinMode::NoWait)
  }

  pub fn builtin_join(mut self, step_id: &str, tag: &str, config: Value, mode: JoinMode) -> Self {
    let step = builtin_registry().create(tag, &config).unwrap();
    let node = StepNode::new(step_id, tag, step, config).with_join_mode(mode);
    self.flow.add_step(node).unwrap();
    self
  }

  pub fn edge(mut self, source: &str, target: &str) -> Self {
    self.flow.connect(source, target).unwrap();
    self
  }

  pub fn port_edge(mut self, source: &str, port: &str, target: &str) -> Self {
    self.flow.add_edge(source, target, port, "default").unwrap();
    self
  }

  pub fn build(self) -> Flow {
    self.flow
  }
}

/// Event stream invariants every run must satisfy.
pub fn assert_well_formed(report: &RunReport) {
  let events = &report.events;
  assert!(matches!(events.first(), Some(FlowEvent::FlowStarted { .. })));
  assert!(matches!(events.last(), Some(FlowEvent::FlowCompleted { .. })));
  assert_eq!(
    events.iter().filter(|e| matches!(e, FlowEvent::FlowStarted { .. })).count(),
    1
  );
  assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
  assert!(events.iter().all(|e| e.run_id() == report.run_id));

  for (i, event) in events.iter().enumerate() {
    if let FlowEvent::StepStarted { invocation_id, .. } = event {
      let completed_at = events.iter().position(|e| {
        matches!(e, FlowEvent::StepCompleted { result, .. } if &result.invocation_id == invocation_id)
      });
      assert!(
        completed_at.is_some_and(|at| at > i),
        "invocation {} started without completing",
        invocation_id
      );
    }
  }
}
