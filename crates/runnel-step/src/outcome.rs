//! Step outcomes and run results.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal status of one step invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Succeeded,
  Failed,
  Skipped,
}

impl StepStatus {
  pub fn is_success(&self) -> bool {
    matches!(self, StepStatus::Succeeded)
  }
}

impl fmt::Display for StepStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StepStatus::Succeeded => "succeeded",
      StepStatus::Failed => "failed",
      StepStatus::Skipped => "skipped",
    };
    f.write_str(name)
  }
}

/// Error detail attached to a FAILED result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  /// Structured context, e.g. the HTTP status of a failed request.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<Value>,
}

/// What a step reports back from [`Step::run`](crate::Step::run).
///
/// An empty `ports` list leaves port selection to the engine: the `default`
/// port on success, the failure port on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
  pub status: StepStatus,
  pub ports: Vec<String>,
  pub output: Option<Value>,
  pub error: Option<StepFailure>,
  /// Fire and forget: the result is recorded but nothing downstream is
  /// activated.
  pub continue_without_waiting: bool,
}

impl StepOutcome {
  pub fn success(output: Value) -> Self {
    Self {
      status: StepStatus::Succeeded,
      ports: Vec::new(),
      output: Some(output),
      error: None,
      continue_without_waiting: false,
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      status: StepStatus::Failed,
      ports: Vec::new(),
      output: None,
      error: Some(StepFailure {
        message: message.into(),
        code: None,
        details: None,
      }),
      continue_without_waiting: false,
    }
  }

  pub fn skipped() -> Self {
    Self {
      status: StepStatus::Skipped,
      ports: Vec::new(),
      output: None,
      error: None,
      continue_without_waiting: false,
    }
  }

  /// Activate exactly `port`.
  pub fn on_port(mut self, port: impl Into<String>) -> Self {
    self.ports = vec![port.into()];
    self
  }

  pub fn with_output(mut self, output: Value) -> Self {
    self.output = Some(output);
    self
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    if let Some(error) = self.error.as_mut() {
      error.code = Some(code.into());
    }
    self
  }

  pub fn with_details(mut self, details: Value) -> Self {
    if let Some(error) = self.error.as_mut() {
      error.details = Some(details);
    }
    self
  }

  /// Record the result without routing it downstream.
  pub fn without_waiting(mut self) -> Self {
    self.continue_without_waiting = true;
    self
  }
}

/// The recorded result of one step invocation, as carried by
/// `StepCompleted` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRunResult {
  pub step_id: String,
  pub invocation_id: String,
  pub status: StepStatus,
  /// Ports whose outgoing edges fire.
  pub ports: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<StepFailure>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<String>,
  /// Set for fire-and-forget results; no edge leaving the step fires.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub continue_without_waiting: bool,
}

impl StepRunResult {
  /// A SKIPPED result for a step that never ran.
  pub fn skipped(
    step_id: impl Into<String>,
    invocation_id: impl Into<String>,
    ports: Vec<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      step_id: step_id.into(),
      invocation_id: invocation_id.into(),
      status: StepStatus::Skipped,
      ports,
      output: None,
      error: None,
      skip_reason: Some(reason.into()),
      continue_without_waiting: false,
    }
  }

  pub fn error_message(&self) -> Option<&str> {
    self.error.as_ref().map(|e| e.message.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_outcome_builders() {
    let outcome = StepOutcome::success(json!({ "k": 1 })).on_port("true");
    assert_eq!(outcome.status, StepStatus::Succeeded);
    assert_eq!(outcome.ports, vec!["true"]);

    let failed = StepOutcome::failure("boom").with_code("http_error").on_port("error");
    assert_eq!(failed.error.as_ref().unwrap().code.as_deref(), Some("http_error"));
    assert_eq!(failed.ports, vec!["error"]);

    let detailed = StepOutcome::failure("bad status").with_details(json!({ "status": 502 }));
    assert_eq!(detailed.error.unwrap().details, Some(json!({ "status": 502 })));

    let background = StepOutcome::success(json!({})).without_waiting();
    assert!(background.continue_without_waiting);
    // Details only attach to failures.
    assert!(StepOutcome::success(json!({})).with_details(json!(1)).error.is_none());
  }

  #[test]
  fn test_result_serialization_omits_empty_fields() {
    let result = StepRunResult::skipped("c", "inv-1", vec!["default".to_string()], "upstream skipped");
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(
      value,
      json!({
        "step_id": "c",
        "invocation_id": "inv-1",
        "status": "skipped",
        "ports": ["default"],
        "skip_reason": "upstream skipped"
      })
    );
  }
}
