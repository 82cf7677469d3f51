use std::fmt;

use async_trait::async_trait;
use runnel_state::{StateType, render_value};
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
  is_template, parse_config, require_field,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Builtin;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
  #[default]
  Equals,
  NotEquals,
  Contains,
  NotContains,
  GreaterThan,
  LessThan,
}

impl Operator {
  const NAMES: [&'static str; 6] = [
    "equals",
    "not_equals",
    "contains",
    "not_contains",
    "greater_than",
    "less_than",
  ];
}

impl fmt::Display for Operator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let index = *self as usize;
    f.write_str(Self::NAMES[index])
  }
}

/// Compare two rendered values.
///
/// Ordering operators compare numerically when both sides parse as numbers
/// and fall back to lexicographic order otherwise.
pub fn evaluate_condition(left: &str, operator: Operator, right: &str) -> bool {
  match operator {
    Operator::Equals => left == right,
    Operator::NotEquals => left != right,
    Operator::Contains => left.contains(right),
    Operator::NotContains => !left.contains(right),
    Operator::GreaterThan => match numbers(left, right) {
      Some((l, r)) => l > r,
      None => left > right,
    },
    Operator::LessThan => match numbers(left, right) {
      Some((l, r)) => l < r,
      None => left < right,
    },
  }
}

fn numbers(left: &str, right: &str) -> Option<(f64, f64)> {
  let l = left.trim().parse::<f64>().ok()?;
  let r = right.trim().parse::<f64>().ok()?;
  Some((l, r))
}

#[derive(Debug, Deserialize)]
struct ConditionalConfig {
  left: Value,
  #[serde(default)]
  operator: Operator,
  right: Value,
}

/// Branches on a comparison: activates `true` or `false`.
#[derive(Debug, Clone, Default)]
pub struct Conditional;

impl Builtin for Conditional {
  const TAG: &'static str = "conditional";

  fn describe() -> StepInfo {
    StepInfo::new("Conditional", "Branch based on a condition", StepCategory::Logic)
      .with_icon("fork")
      .with_color("#FF5722")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    require_field(config, "left", &mut errors);
    require_field(config, "right", &mut errors);
    if let Some(op) = config.get("operator") {
      let known = op.as_str().is_some_and(|s| Operator::NAMES.contains(&s));
      if !known && !is_template(op) {
        errors.push(FieldError::new(
          "operator",
          format!("must be one of {}", Operator::NAMES.join(", ")),
        ));
      }
    }
    if errors.is_empty() {
      Ok(Conditional)
    } else {
      Err(errors)
    }
  }
}

#[async_trait]
impl Step for Conditional {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn ports(&self) -> Vec<String> {
    vec!["true".to_string(), "false".to_string()]
  }

  fn outputs(&self) -> Vec<Output> {
    vec![Output::new(
      "condition_result",
      StateType::Boolean,
      "Result of the comparison",
    )]
  }

  async fn run(&self, _ctx: &StepContext, config: Value) -> Result<StepOutcome, StepError> {
    let config: ConditionalConfig = parse_config(config)?;
    let result = evaluate_condition(
      &render_value(&config.left),
      config.operator,
      &render_value(&config.right),
    );
    let port = if result { "true" } else { "false" };
    Ok(StepOutcome::success(json!({ "condition_result": result })).on_port(port))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ctx;
  use runnel_state::StateContainer;

  #[test]
  fn test_evaluate_condition() {
    assert!(evaluate_condition("admin", Operator::Equals, "admin"));
    assert!(evaluate_condition("admin", Operator::NotEquals, "user"));
    assert!(evaluate_condition("hello world", Operator::Contains, "world"));
    assert!(evaluate_condition("hello", Operator::NotContains, "world"));
    assert!(evaluate_condition("10", Operator::GreaterThan, "9"));
    assert!(evaluate_condition("2.5", Operator::LessThan, "10"));
    assert!(evaluate_condition("b", Operator::GreaterThan, "a"));
    assert!(!evaluate_condition("10", Operator::GreaterThan, "abc"));
  }

  #[test]
  fn test_operator_display_matches_serde() {
    for op in [Operator::Equals, Operator::NotContains, Operator::LessThan] {
      assert_eq!(serde_json::to_value(op).unwrap(), json!(op.to_string()));
    }
  }

  #[test]
  fn test_config_validation() {
    assert!(Conditional::from_config(&json!({ "left": "{{role}}", "right": "admin" })).is_ok());
    let errors =
      Conditional::from_config(&json!({ "left": "a", "operator": "matches" })).unwrap_err();
    let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["right", "operator"]);
  }

  #[tokio::test]
  async fn test_activates_true_port() {
    let outcome = Conditional
      .run(
        &ctx(StateContainer::new()),
        json!({ "left": "admin", "operator": "equals", "right": "admin" }),
      )
      .await
      .unwrap();
    assert_eq!(outcome.ports, vec!["true"]);
    assert_eq!(outcome.output, Some(json!({ "condition_result": true })));
  }

  #[tokio::test]
  async fn test_typed_values_compare_as_text() {
    let outcome = Conditional
      .run(
        &ctx(StateContainer::new()),
        json!({ "left": 42, "operator": "greater_than", "right": "7" }),
      )
      .await
      .unwrap();
    assert_eq!(outcome.ports, vec!["true"]);
  }
}
