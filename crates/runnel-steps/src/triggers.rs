//! Trigger steps.
//!
//! A trigger marks where a run starts. By the time it runs, whatever
//! started the run has already seeded the state with the trigger's outputs;
//! the trigger reports those values and activates `default`.

use async_trait::async_trait;
use runnel_state::StateType;
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
  require_str,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Builtin;

const WEBHOOK_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Collect the declared outputs that are present in state.
pub(crate) fn seeded_outputs(ctx: &StepContext, outputs: &[Output]) -> Value {
  let mut found = Map::new();
  for output in outputs {
    if let Ok(value) = ctx.state.get(&output.key) {
      found.insert(output.key.clone(), value);
    }
  }
  Value::Object(found)
}

fn parse_trigger_config<T: for<'de> Deserialize<'de>>(
  config: &Value,
  mut errors: Vec<FieldError>,
) -> Result<T, Vec<FieldError>> {
  if !errors.is_empty() {
    return Err(errors);
  }
  serde_json::from_value(config.clone()).map_err(|e| {
    errors.push(FieldError::new("config", e.to_string()));
    errors
  })
}

/// Started by hand, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger;

impl Builtin for ManualTrigger {
  const TAG: &'static str = "trigger_manual";

  fn describe() -> StepInfo {
    StepInfo::new("Manual", "Start flow by hand", StepCategory::Trigger).with_icon("play")
  }

  fn from_config(_config: &Value) -> Result<Self, Vec<FieldError>> {
    Ok(ManualTrigger)
  }
}

#[async_trait]
impl Step for ManualTrigger {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  async fn run(&self, _ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(Value::Object(Map::new())))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
  #[serde(default = "default_webhook_method")]
  pub method: String,
  pub path: String,
}

fn default_webhook_method() -> String {
  "POST".to_string()
}

/// Started by an incoming HTTP request.
#[derive(Debug, Clone)]
pub struct WebhookTrigger {
  pub config: WebhookConfig,
}

impl Builtin for WebhookTrigger {
  const TAG: &'static str = "trigger_webhook";

  fn describe() -> StepInfo {
    StepInfo::new(
      "Webhook",
      "Start flow when HTTP request received",
      StepCategory::Trigger,
    )
    .with_icon("webhook")
    .with_color("#4CAF50")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    require_str(config, "path", &mut errors);
    if let Some(method) = config.get("method") {
      match method.as_str() {
        Some(m) if WEBHOOK_METHODS.contains(&m) => {}
        _ => errors.push(FieldError::new(
          "method",
          format!("must be one of {}", WEBHOOK_METHODS.join(", ")),
        )),
      }
    }
    parse_trigger_config(config, errors).map(|config| Self { config })
  }
}

#[async_trait]
impl Step for WebhookTrigger {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![
      Output::new("body", StateType::Any, "Request body"),
      Output::new("headers", StateType::Object, "Request headers"),
      Output::new("method", StateType::Text, "HTTP method"),
      Output::new("query", StateType::Object, "Query parameters"),
    ]
  }

  async fn run(&self, ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(seeded_outputs(ctx, &self.outputs())))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
  pub cron: String,
  #[serde(default = "default_timezone")]
  pub timezone: String,
}

fn default_timezone() -> String {
  "UTC".to_string()
}

/// Started on a cron schedule by an external scheduler.
#[derive(Debug, Clone)]
pub struct ScheduleTrigger {
  pub config: ScheduleConfig,
}

impl Builtin for ScheduleTrigger {
  const TAG: &'static str = "trigger_schedule";

  fn describe() -> StepInfo {
    StepInfo::new("Schedule", "Start flow on a schedule", StepCategory::Trigger)
      .with_icon("schedule")
      .with_color("#FF9800")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    if let Some(cron) = require_str(config, "cron", &mut errors) {
      let fields = cron.split_whitespace().count();
      if !(5..=6).contains(&fields) {
        errors.push(FieldError::new(
          "cron",
          format!("expected 5 or 6 fields, got {}", fields),
        ));
      }
    }
    parse_trigger_config(config, errors).map(|config| Self { config })
  }
}

#[async_trait]
impl Step for ScheduleTrigger {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![
      Output::new("scheduled_time", StateType::Text, "Scheduled execution time (ISO)"),
      Output::new("actual_time", StateType::Text, "Actual execution time (ISO)"),
    ]
  }

  async fn run(&self, ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(seeded_outputs(ctx, &self.outputs())))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
  pub event_name: String,
}

/// Started when a named application event fires.
#[derive(Debug, Clone)]
pub struct EventTrigger {
  pub config: EventConfig,
}

impl Builtin for EventTrigger {
  const TAG: &'static str = "trigger_event";

  fn describe() -> StepInfo {
    StepInfo::new("Event", "Start flow when event fires", StepCategory::Trigger)
      .with_icon("bolt")
      .with_color("#9C27B0")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    require_str(config, "event_name", &mut errors);
    parse_trigger_config(config, errors).map(|config| Self { config })
  }
}

#[async_trait]
impl Step for EventTrigger {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![
      Output::new("event_name", StateType::Text, "Name of the event"),
      Output::new("event_data", StateType::Any, "Event payload data"),
      Output::new("event_timestamp", StateType::Text, "Event timestamp (ISO)"),
    ]
  }

  async fn run(&self, ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(seeded_outputs(ctx, &self.outputs())))
  }
}
