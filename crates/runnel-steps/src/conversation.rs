//! Conversation entry points.

use async_trait::async_trait;
use runnel_state::StateType;
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
};
use serde_json::Value;

use crate::Builtin;
use crate::triggers::seeded_outputs;

/// Start of a conversational flow. The conversation id is seeded by the
/// caller.
#[derive(Debug, Clone, Default)]
pub struct ConversationStart;

impl Builtin for ConversationStart {
  const TAG: &'static str = "conversation_start";

  fn describe() -> StepInfo {
    StepInfo::new(
      "Conversation Start",
      "Start of a conversation flow",
      StepCategory::Trigger,
    )
    .with_icon("chat")
    .with_color("#4CAF50")
  }

  fn from_config(_config: &Value) -> Result<Self, Vec<FieldError>> {
    Ok(ConversationStart)
  }
}

#[async_trait]
impl Step for ConversationStart {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![Output::new(
      "conversation_id",
      StateType::Text,
      "Conversation identifier",
    )]
  }

  async fn run(&self, ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(seeded_outputs(ctx, &self.outputs())))
  }
}

/// Receipt of a user message; the message is placed in state by the caller.
#[derive(Debug, Clone, Default)]
pub struct UserMessage;

impl Builtin for UserMessage {
  const TAG: &'static str = "user_message";

  fn describe() -> StepInfo {
    StepInfo::new(
      "User Message",
      "Receive user message input",
      StepCategory::Communication,
    )
    .with_icon("user")
    .with_color("#2196F3")
  }

  fn from_config(_config: &Value) -> Result<Self, Vec<FieldError>> {
    Ok(UserMessage)
  }
}

#[async_trait]
impl Step for UserMessage {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn outputs(&self) -> Vec<Output> {
    vec![
      Output::new("user_message", StateType::Text, "User's message text"),
      Output::new("user_id", StateType::Text, "User identifier"),
    ]
  }

  async fn run(&self, ctx: &StepContext, _config: Value) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::success(seeded_outputs(ctx, &self.outputs())))
  }
}
