//! Static checks over a built [`Flow`].
//!
//! Validation never runs step logic and never stops at the first problem:
//! every finding is collected and callers decide whether to refuse
//! execution. Only [`Severity::Error`] entries make a flow invalid;
//! warnings point at references no upstream step is known to produce.

use std::collections::HashSet;
use std::fmt;

use runnel_state::{StatePath, extract_refs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::flow::Flow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateOptions {
  /// Accept flows whose edges form cycles.
  pub allow_cycles: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Error,
  Warning,
}

/// A single validation finding. `step_id` is `None` for flow-level issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
  pub step_id: Option<String>,
  /// Config field, or flow part, the finding is about.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
  /// The offending reference or name within `field`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reference: Option<String>,
  pub message: String,
  pub severity: Severity,
}

impl ValidationError {
  fn error(step_id: Option<&str>, message: impl Into<String>) -> Self {
    Self {
      step_id: step_id.map(str::to_string),
      field: None,
      reference: None,
      message: message.into(),
      severity: Severity::Error,
    }
  }

  fn warning(step_id: &str, message: impl Into<String>) -> Self {
    Self {
      step_id: Some(step_id.to_string()),
      field: None,
      reference: None,
      message: message.into(),
      severity: Severity::Warning,
    }
  }

  fn at(mut self, field: impl Into<String>, reference: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self.reference = Some(reference.into());
    self
  }

  pub fn is_error(&self) -> bool {
    self.severity == Severity::Error
  }
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let level = match self.severity {
      Severity::Error => "error",
      Severity::Warning => "warning",
    };
    match &self.step_id {
      Some(step_id) => write!(f, "{}: step '{}': {}", level, step_id, self.message),
      None => write!(f, "{}: {}", level, self.message),
    }
  }
}

/// Whether any finding is an error rather than a warning.
pub fn has_errors(findings: &[ValidationError]) -> bool {
  findings.iter().any(ValidationError::is_error)
}

/// Validate with default options (cycles are errors).
pub fn validate(flow: &Flow) -> Vec<ValidationError> {
  validate_with(flow, ValidateOptions::default())
}

pub fn validate_with(flow: &Flow, options: ValidateOptions) -> Vec<ValidationError> {
  let mut findings = Vec::new();
  let graph = flow.graph();

  let mut orphans: HashSet<&str> = HashSet::new();
  for node in flow.steps() {
    if !node.is_trigger() && graph.in_degree(&node.step_id) == 0 {
      orphans.insert(&node.step_id);
      findings.push(ValidationError::error(
        Some(&node.step_id),
        "step has no incoming edges and is not a trigger",
      ));
    }
  }

  let triggers: Vec<&str> = flow.triggers().map(|t| t.step_id.as_str()).collect();
  let reachable = graph.reachable_from(triggers.iter().copied());
  for node in flow.steps() {
    if !reachable.contains(&node.step_id) && !orphans.contains(node.step_id.as_str()) {
      findings.push(ValidationError::error(
        Some(&node.step_id),
        "step is not reachable from any trigger",
      ));
    }
  }

  if !options.allow_cycles {
    for step_id in graph.cycle_entries() {
      findings.push(ValidationError::error(
        Some(&step_id),
        "step is part of a cycle",
      ));
    }
  }

  if triggers.is_empty() && !flow.is_empty() {
    findings.push(ValidationError::error(None, "flow has no trigger step").at("flow", "triggers"));
  }

  check_references(flow, &mut findings);

  debug!(
    flow_id = %flow.flow_id,
    errors = findings.iter().filter(|f| f.is_error()).count(),
    warnings = findings.iter().filter(|f| !f.is_error()).count(),
    "flow validated"
  );
  findings
}

/// Warn about `{{path}}` references whose root key no upstream step declares.
fn check_references(flow: &Flow, findings: &mut Vec<ValidationError>) {
  for node in flow.steps() {
    let refs = config_refs(&node.config);
    if refs.is_empty() {
      continue;
    }

    let ancestors = flow.ancestors(&node.step_id);
    let upstream: Vec<_> = ancestors.iter().filter_map(|id| flow.step(id)).collect();
    // A trigger without declared outputs accepts an arbitrary payload.
    if upstream
      .iter()
      .any(|s| s.is_trigger() && s.outputs().is_empty())
    {
      continue;
    }

    let known: HashSet<String> = upstream
      .iter()
      .flat_map(|s| s.outputs())
      .map(|o| root_of(&o.key))
      .collect();

    for (field, reference) in refs {
      match StatePath::parse(&reference) {
        Ok(path) if known.contains(path.root()) => {}
        Ok(path) => findings.push(
          ValidationError::warning(
            &node.step_id,
            format!(
              "reference '{{{{{}}}}}' uses '{}', which no upstream step produces",
              reference,
              path.root()
            ),
          )
          .at(field, reference),
        ),
        Err(e) => findings.push(
          ValidationError::warning(
            &node.step_id,
            format!("invalid reference '{{{{{}}}}}': {}", reference, e),
          )
          .at(field, reference),
        ),
      }
    }
  }
}

/// References per top-level config field, as `(field, reference)`.
fn config_refs(config: &Value) -> Vec<(String, String)> {
  match config {
    Value::Object(fields) => fields
      .iter()
      .flat_map(|(field, value)| {
        extract_refs(value)
          .into_iter()
          .map(move |reference| (field.clone(), reference))
      })
      .collect(),
    other => extract_refs(other)
      .into_iter()
      .map(|reference| ("config".to_string(), reference))
      .collect(),
  }
}

fn root_of(key: &str) -> String {
  key.split('.').next().unwrap_or(key).to_string()
}
