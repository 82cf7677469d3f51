use runnel_step::FieldError;
use thiserror::Error;

/// Errors raised while assembling a flow. Construction stops at the first.
#[derive(Debug, Error)]
pub enum FlowError {
  #[error("duplicate step id: {step_id}")]
  DuplicateStep { step_id: String },

  #[error("unknown step: {step_id}")]
  UnknownStep { step_id: String },

  #[error("step '{step_id}' declares no output ports")]
  NoPorts { step_id: String },

  #[error("step '{step_id}' has no port '{port}' (available: {})", .available.join(", "))]
  UnknownPort {
    step_id: String,
    port: String,
    available: Vec<String>,
  },

  #[error("step '{step_id}' has unknown type '{step_type}'")]
  UnknownStepType { step_id: String, step_type: String },

  #[error("step '{step_id}' has invalid config: {}", join_fields(.errors))]
  InvalidConfig {
    step_id: String,
    errors: Vec<FieldError>,
  },
}

fn join_fields(errors: &[FieldError]) -> String {
  errors
    .iter()
    .map(|e| e.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}
