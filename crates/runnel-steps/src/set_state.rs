use async_trait::async_trait;
use runnel_state::{StatePath, StateType};
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
  is_template, parse_config, require_field, require_str,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::Builtin;

#[derive(Debug, Deserialize)]
struct SetStateConfig {
  key: String,
  value: Value,
}

/// Saves a value to state under a fixed key. The key may be a dotted path.
#[derive(Debug, Clone)]
pub struct SetState {
  key: String,
}

impl SetState {
  pub fn key(&self) -> &str {
    &self.key
  }
}

impl Builtin for SetState {
  const TAG: &'static str = "set_state";

  fn describe() -> StepInfo {
    StepInfo::new("Set State", "Save a value to flow state", StepCategory::Utility)
      .with_icon("save")
      .with_color("#795548")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    let key = require_str(config, "key", &mut errors).map(str::to_string);
    require_field(config, "value", &mut errors);

    if let Some(key) = &key {
      if is_template(&Value::String(key.clone())) {
        errors.push(FieldError::new("key", "must be a literal state path"));
      } else if let Err(e) = StatePath::parse(key) {
        errors.push(FieldError::new("key", e.to_string()));
      }
    }

    match key {
      Some(key) if errors.is_empty() => Ok(Self { key }),
      _ => Err(errors),
    }
  }
}

#[async_trait]
impl Step for SetState {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![Output::new(self.key.clone(), StateType::Any, "Value set by this step")]
  }

  async fn run(&self, _ctx: &StepContext, config: Value) -> Result<StepOutcome, StepError> {
    let config: SetStateConfig = parse_config(config)?;
    let mut output = Map::new();
    output.insert(config.key, config.value);
    Ok(StepOutcome::success(Value::Object(output)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ctx;
  use runnel_state::StateContainer;
  use serde_json::json;

  #[test]
  fn test_config_validation() {
    assert!(SetState::from_config(&json!({ "key": "user.name", "value": "{{name}}" })).is_ok());

    let errors = SetState::from_config(&json!({ "key": "{{dynamic}}", "value": 1 })).unwrap_err();
    assert_eq!(errors[0].field, "key");

    let errors = SetState::from_config(&json!({ "key": "a..b" })).unwrap_err();
    let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["value", "key"]);
  }

  #[tokio::test]
  async fn test_outputs_key_value() {
    let step = SetState::from_config(&json!({ "key": "x", "value": "5" })).unwrap();
    assert_eq!(step.outputs()[0].key, "x");

    let outcome = step
      .run(&ctx(StateContainer::new()), json!({ "key": "x", "value": "5" }))
      .await
      .unwrap();
    assert_eq!(outcome.output, Some(json!({ "x": "5" })));
  }
}
