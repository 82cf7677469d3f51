use std::time::Duration;

use async_trait::async_trait;
use runnel_state::StateType;
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
  check_range, parse_config,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::Builtin;
use crate::value;

const MAX_SECONDS: f64 = 300.0;

#[derive(Debug, Deserialize)]
struct DelayConfig {
  #[serde(default = "default_seconds", deserialize_with = "value::number")]
  seconds: f64,
}

fn default_seconds() -> f64 {
  1.0
}

/// Pauses the branch for a number of seconds. Cancellation ends the wait
/// early.
#[derive(Debug, Clone, Default)]
pub struct Delay;

impl Builtin for Delay {
  const TAG: &'static str = "delay";

  fn describe() -> StepInfo {
    StepInfo::new(
      "Delay",
      "Pause execution for specified seconds",
      StepCategory::Utility,
    )
    .with_icon("timer")
    .with_color("#607D8B")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    check_range(config, "seconds", 0.0, MAX_SECONDS, &mut errors);
    if errors.is_empty() {
      Ok(Delay)
    } else {
      Err(errors)
    }
  }
}

#[async_trait]
impl Step for Delay {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![Output::new(
      "delayed_seconds",
      StateType::Number,
      "Actual delay duration",
    )]
  }

  async fn run(&self, ctx: &StepContext, config: Value) -> Result<StepOutcome, StepError> {
    let config: DelayConfig = parse_config(config)?;
    let seconds = config.seconds;
    if !(0.0..=MAX_SECONDS).contains(&seconds) {
      return Err(StepError::InvalidConfig {
        message: format!("seconds must be between 0 and {}, got {}", MAX_SECONDS, seconds),
      });
    }

    debug!(step_id = %ctx.step_id, seconds, "delay started");
    tokio::select! {
      _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => {}
      _ = ctx.cancel.cancelled() => return Err(StepError::Cancelled),
    }

    Ok(StepOutcome::success(json!({ "delayed_seconds": seconds })))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ctx;
  use runnel_state::StateContainer;

  #[test]
  fn test_range_validation() {
    assert!(Delay::from_config(&json!({ "seconds": 2 })).is_ok());
    assert!(Delay::from_config(&json!({ "seconds": "{{wait}}" })).is_ok());
    assert!(Delay::from_config(&json!({ "seconds": 301 })).is_err());
    assert!(Delay::from_config(&json!({ "seconds": -1 })).is_err());
  }

  #[tokio::test]
  async fn test_short_delay() {
    let outcome = Delay
      .run(&ctx(StateContainer::new()), json!({ "seconds": "0.01" }))
      .await
      .unwrap();
    assert_eq!(outcome.output, Some(json!({ "delayed_seconds": 0.01 })));
  }

  #[tokio::test]
  async fn test_resolved_value_out_of_range() {
    let err = Delay
      .run(&ctx(StateContainer::new()), json!({ "seconds": 1000 }))
      .await
      .unwrap_err();
    assert_eq!(err.code(), "invalid_config");
  }

  #[tokio::test]
  async fn test_cancel_interrupts_wait() {
    let ctx = ctx(StateContainer::new());
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      cancel.cancel();
    });

    let started = std::time::Instant::now();
    let err = Delay.run(&ctx, json!({ "seconds": 60 })).await.unwrap_err();
    assert!(matches!(err, StepError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
  }
}
