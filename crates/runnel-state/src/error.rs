//! State and interpolation error types.

use thiserror::Error;

/// Errors raised by state container operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
  /// Nothing is stored at the path.
  #[error("state path not found: {path}")]
  NotFound { path: String },

  /// The path string does not follow the path grammar.
  #[error("invalid state path '{path}': {reason}")]
  InvalidPath { path: String, reason: String },

  /// A write had to traverse through a scalar value.
  #[error("cannot write '{path}': segment '{segment}' is not a mapping or sequence")]
  NotAContainer { path: String, segment: String },

  /// A write addressed a sequence index past its end.
  #[error("cannot write '{path}': index {index} out of bounds (len {len})")]
  IndexOutOfBounds {
    path: String,
    index: usize,
    len: usize,
  },

  /// A value could not be cast to the type of its slot.
  #[error("cannot cast value for slot '{slot}' to {expected}: {message}")]
  Cast {
    slot: String,
    expected: String,
    message: String,
  },
}

/// Errors raised while resolving `{{path}}` references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
  /// A referenced path has no value in the state container.
  #[error("unresolved reference '{{{{{path}}}}}'")]
  Unresolved { path: String },

  /// A reference does not follow the path grammar.
  #[error("invalid reference '{{{{{path}}}}}': {reason}")]
  InvalidReference { path: String, reason: String },
}

impl ResolutionError {
  /// The offending path.
  pub fn path(&self) -> &str {
    match self {
      ResolutionError::Unresolved { path } => path,
      ResolutionError::InvalidReference { path, .. } => path,
    }
  }
}
