//! Runnel Steps
//!
//! Built-in step types. [`builtin_registry`] returns a [`StepRegistry`] with
//! every one of them registered under its type tag:
//!
//! | tag | step |
//! |---|---|
//! | `trigger_manual` | [`ManualTrigger`] |
//! | `trigger_webhook` | [`WebhookTrigger`] |
//! | `trigger_schedule` | [`ScheduleTrigger`] |
//! | `trigger_event` | [`EventTrigger`] |
//! | `conversation_start` | [`ConversationStart`] |
//! | `user_message` | [`UserMessage`] |
//! | `set_state` | [`SetState`] |
//! | `conditional` | [`Conditional`] |
//! | `switch` | [`Switch`] |
//! | `delay` | [`Delay`] |
//! | `request` | [`Request`] |
//! | `reply` | [`Reply`] |
//!
//! Triggers do no work when run; the data they represent is seeded into the
//! run's state beforehand (see [`seed`]).

mod conditional;
mod conversation;
mod delay;
mod reply;
mod request;
mod security;
pub mod seed;
mod set_state;
mod switch;
mod triggers;
mod value;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use runnel_step::{FieldError, RegistryError, Step, StepInfo, StepRegistry};
use serde_json::Value;

pub use conditional::{Conditional, Operator, evaluate_condition};
pub use conversation::{ConversationStart, UserMessage};
pub use delay::Delay;
pub use reply::Reply;
pub use request::Request;
pub use security::{UnsafeUrl, validate_safe_url};
pub use set_state::SetState;
pub use switch::Switch;
pub use triggers::{EventTrigger, ManualTrigger, ScheduleTrigger, WebhookTrigger};

/// A built-in step type: its tag, metadata and validating constructor.
pub(crate) trait Builtin: Step + Sized + 'static {
  const TAG: &'static str;

  fn describe() -> StepInfo;

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>>;
}

fn register<S: Builtin>(registry: &mut StepRegistry) -> Result<(), RegistryError> {
  registry.register(S::TAG, S::describe(), |config| {
    S::from_config(config).map(|step| Arc::new(step) as Arc<dyn Step>)
  })
}

/// Register every built-in step type into `registry`.
pub fn register_builtins(registry: &mut StepRegistry) -> Result<(), RegistryError> {
  register::<ManualTrigger>(registry)?;
  register::<WebhookTrigger>(registry)?;
  register::<ScheduleTrigger>(registry)?;
  register::<EventTrigger>(registry)?;
  register::<ConversationStart>(registry)?;
  register::<UserMessage>(registry)?;
  register::<SetState>(registry)?;
  register::<Conditional>(registry)?;
  register::<Switch>(registry)?;
  register::<Delay>(registry)?;
  register::<Request>(registry)?;
  register::<Reply>(registry)?;
  Ok(())
}

/// A registry holding every built-in step type.
pub fn builtin_registry() -> StepRegistry {
  let mut registry = StepRegistry::new();
  // Tags are distinct and the registry starts empty.
  if let Err(e) = register_builtins(&mut registry) {
    tracing::error!(error = %e, "failed to register built-in steps");
  }
  registry
}
