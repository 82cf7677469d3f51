use thiserror::Error;

use crate::config::FieldError;

/// Errors a step reports from [`Step::run`](crate::Step::run).
///
/// The engine converts every variant except [`StepError::Cancelled`] into a
/// FAILED result.
#[derive(Debug, Error)]
pub enum StepError {
  /// The resolved configuration does not fit the step's config type.
  #[error("invalid config: {message}")]
  InvalidConfig { message: String },

  /// The step ran and could not do its work.
  #[error("{message}")]
  Execution { message: String, code: Option<String> },

  /// The step observed its cancellation token.
  #[error("step cancelled")]
  Cancelled,
}

impl StepError {
  pub fn execution(message: impl Into<String>) -> Self {
    StepError::Execution {
      message: message.into(),
      code: None,
    }
  }

  /// Machine-readable error code carried into the run result.
  pub fn code(&self) -> &str {
    match self {
      StepError::InvalidConfig { .. } => "invalid_config",
      StepError::Execution { code: Some(code), .. } => code,
      StepError::Execution { code: None, .. } => "execution_error",
      StepError::Cancelled => "cancelled",
    }
  }
}

/// Errors from the step registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("step type '{tag}' is already registered")]
  Duplicate { tag: String },

  #[error("unknown step type '{tag}'")]
  UnknownType { tag: String },

  #[error("invalid config for step type '{tag}': {}", join_fields(.errors))]
  InvalidConfig { tag: String, errors: Vec<FieldError> },
}

fn join_fields(errors: &[FieldError]) -> String {
  errors
    .iter()
    .map(|e| e.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}
