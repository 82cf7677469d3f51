use runnel_state::StateError;
use thiserror::Error;

/// Errors raised before a run starts, or by the runner loop.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("unknown step: {step_id}")]
  UnknownStep { step_id: String },

  #[error("step '{step_id}' is not a trigger and cannot start a run")]
  NotATrigger { step_id: String },

  #[error("flow has no trigger step")]
  NoTrigger,

  #[error("flow runner channel closed")]
  ChannelClosed,

  #[error("invalid initial state: {0}")]
  State(#[from] StateError),
}
