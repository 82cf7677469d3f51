use async_trait::async_trait;
use runnel_state::{StateType, render_value};
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
};
use serde_json::{Value, json};

use crate::Builtin;

/// Renders a reply message from its `template`.
#[derive(Debug, Clone, Default)]
pub struct Reply;

impl Builtin for Reply {
  const TAG: &'static str = "reply";

  fn describe() -> StepInfo {
    StepInfo::new("Reply", "Generate a reply message", StepCategory::Communication)
      .with_icon("message")
      .with_color("#00BCD4")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    match config.get("template") {
      None | Some(Value::Null) | Some(Value::String(_)) => Ok(Reply),
      Some(_) => Err(vec![FieldError::new("template", "must be a string")]),
    }
  }
}

#[async_trait]
impl Step for Reply {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![Output::new("reply", StateType::Text, "Generated reply")]
  }

  async fn run(&self, _ctx: &StepContext, config: Value) -> Result<StepOutcome, StepError> {
    let reply = config
      .get("template")
      .map(render_value)
      .unwrap_or_default();
    Ok(StepOutcome::success(json!({ "reply": reply })))
  }
}
