use std::fmt;
use std::sync::Arc;

use runnel_config::JoinMode;
use runnel_step::{Output, Step};
use serde_json::Value;

/// A step instance placed in a flow.
#[derive(Clone)]
pub struct StepNode {
  pub step_id: String,
  /// Registry tag the step was built from.
  pub step_type: String,
  /// Raw configuration, resolved against state on every invocation.
  pub config: Value,
  pub join_mode: JoinMode,
  step: Arc<dyn Step>,
  ports: Vec<String>,
}

impl StepNode {
  pub fn new(
    step_id: impl Into<String>,
    step_type: impl Into<String>,
    step: Arc<dyn Step>,
    config: Value,
  ) -> Self {
    let ports = step.ports();
    Self {
      step_id: step_id.into(),
      step_type: step_type.into(),
      config,
      join_mode: JoinMode::default(),
      step,
      ports,
    }
  }

  pub fn with_join_mode(mut self, join_mode: JoinMode) -> Self {
    self.join_mode = join_mode;
    self
  }

  pub fn step(&self) -> &Arc<dyn Step> {
    &self.step
  }

  pub fn ports(&self) -> &[String] {
    &self.ports
  }

  pub fn has_port(&self, port: &str) -> bool {
    self.ports.iter().any(|p| p == port)
  }

  pub fn is_trigger(&self) -> bool {
    self.step.is_trigger()
  }

  pub fn outputs(&self) -> Vec<Output> {
    self.step.outputs()
  }
}

impl fmt::Debug for StepNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepNode")
      .field("step_id", &self.step_id)
      .field("step_type", &self.step_type)
      .field("join_mode", &self.join_mode)
      .field("ports", &self.ports)
      .finish_non_exhaustive()
  }
}
