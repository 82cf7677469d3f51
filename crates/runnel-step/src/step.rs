use std::sync::Arc;

use async_trait::async_trait;
use runnel_config::DEFAULT_PORT;
use runnel_state::StateContainer;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::StepError;
use crate::info::{Output, StepCategory, StepInfo};
use crate::outcome::StepOutcome;

/// Context provided to a step for one invocation.
#[derive(Debug, Clone)]
pub struct StepContext {
  /// Flow run this invocation belongs to.
  pub run_id: String,

  pub flow_id: String,

  pub step_id: String,

  /// Unique ID of this invocation. A NO_WAIT step may be invoked many times
  /// in one run.
  pub invocation_id: String,

  /// The run's shared state.
  pub state: Arc<StateContainer>,

  /// Cancelled when the run is cancelled or a FIRST_SUCCESS join no longer
  /// needs this branch. Long-running steps should select on it.
  pub cancel: CancellationToken,
}

/// A unit of work in a flow.
///
/// Instances are built once per flow from raw configuration and shared by
/// every invocation, so `run` takes `&self` and must not keep per-run data
/// on the instance.
#[async_trait]
pub trait Step: Send + Sync {
  fn info(&self) -> StepInfo;

  /// Output ports this step can activate.
  fn ports(&self) -> Vec<String> {
    vec![DEFAULT_PORT.to_string()]
  }

  /// State keys this step writes on success.
  fn outputs(&self) -> Vec<Output> {
    Vec::new()
  }

  fn is_trigger(&self) -> bool {
    self.info().category == StepCategory::Trigger
  }

  /// Run with the configuration after `{{path}}` resolution.
  async fn run(&self, ctx: &StepContext, config: Value) -> Result<StepOutcome, StepError>;
}
