use std::collections::HashSet;

use async_trait::async_trait;
use runnel_config::DEFAULT_PORT;
use runnel_state::{StateType, render_value};
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
  is_template, parse_config, require_field,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::Builtin;

#[derive(Debug, Deserialize)]
struct Case {
  name: String,
  value: Value,
}

#[derive(Debug, Deserialize)]
struct SwitchConfig {
  value: Value,
  #[serde(default)]
  cases: Vec<Case>,
}

/// Routes on a value: each case is a port, plus `default` for no match.
///
/// Cases are checked in order and the first match wins.
#[derive(Debug, Clone)]
pub struct Switch {
  case_names: Vec<String>,
}

impl Builtin for Switch {
  const TAG: &'static str = "switch";

  fn describe() -> StepInfo {
    StepInfo::new("Switch", "Route flow based on value matching", StepCategory::Logic)
      .with_icon("switch")
      .with_color("#E91E63")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    require_field(config, "value", &mut errors);

    let mut case_names = Vec::new();
    let mut seen = HashSet::new();
    match config.get("cases") {
      None | Some(Value::Null) => {}
      Some(Value::Array(cases)) => {
        for (i, case) in cases.iter().enumerate() {
          let field = format!("cases.{}", i);
          let name = case.get("name").and_then(Value::as_str).unwrap_or("");
          if name.is_empty() {
            errors.push(FieldError::new(format!("{}.name", field), "must be a non-empty string"));
          } else if is_template(&json!(name)) {
            errors.push(FieldError::new(format!("{}.name", field), "must be a literal port name"));
          } else if name == DEFAULT_PORT {
            errors.push(FieldError::new(
              format!("{}.name", field),
              format!("'{}' is reserved for the no-match port", DEFAULT_PORT),
            ));
          } else if !seen.insert(name.to_string()) {
            errors.push(FieldError::new(
              format!("{}.name", field),
              format!("duplicate case '{}'", name),
            ));
          } else {
            case_names.push(name.to_string());
          }
          if case.get("value").is_none() {
            errors.push(FieldError::new(format!("{}.value", field), "field is required"));
          }
        }
      }
      Some(_) => errors.push(FieldError::new("cases", "must be a list")),
    }

    if errors.is_empty() {
      Ok(Self { case_names })
    } else {
      Err(errors)
    }
  }
}

#[async_trait]
impl Step for Switch {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn ports(&self) -> Vec<String> {
    let mut ports = self.case_names.clone();
    ports.push(DEFAULT_PORT.to_string());
    ports
  }

  fn outputs(&self) -> Vec<Output> {
    vec![Output::new(
      "matched_case",
      StateType::Any,
      "Name of the matching case, or null",
    )]
  }

  async fn run(&self, _ctx: &StepContext, config: Value) -> Result<StepOutcome, StepError> {
    let config: SwitchConfig = parse_config(config)?;
    let value = render_value(&config.value);

    let matched = config
      .cases
      .iter()
      .find(|case| render_value(&case.value) == value);

    Ok(match matched {
      Some(case) => {
        StepOutcome::success(json!({ "matched_case": case.name })).on_port(case.name.clone())
      }
      None => StepOutcome::success(json!({ "matched_case": null })).on_port(DEFAULT_PORT),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ctx;
  use runnel_state::StateContainer;

  fn config() -> Value {
    json!({
      "value": "{{tier}}",
      "cases": [
        { "name": "premium", "value": "premium" },
        { "name": "pro", "value": "pro" },
        { "name": "also_pro", "value": "pro" }
      ]
    })
  }

  #[test]
  fn test_ports_from_cases() {
    let step = Switch::from_config(&config()).unwrap();
    assert_eq!(step.ports(), vec!["premium", "pro", "also_pro", "default"]);
  }

  #[test]
  fn test_rejects_bad_cases() {
    let errors = Switch::from_config(&json!({
      "value": "x",
      "cases": [
        { "name": "a", "value": "1" },
        { "name": "a", "value": "2" },
        { "name": "default", "value": "3" },
        { "value": "4" }
      ]
    }))
    .unwrap_err();
    let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["cases.1.name", "cases.2.name", "cases.3.name"]);
  }

  #[tokio::test]
  async fn test_first_match_wins() {
    let step = Switch::from_config(&config()).unwrap();
    let mut resolved = config();
    resolved["value"] = json!("pro");
    let outcome = step.run(&ctx(StateContainer::new()), resolved).await.unwrap();
    assert_eq!(outcome.ports, vec!["pro"]);
    assert_eq!(outcome.output, Some(json!({ "matched_case": "pro" })));
  }

  #[tokio::test]
  async fn test_no_match_activates_default() {
    let step = Switch::from_config(&config()).unwrap();
    let mut resolved = config();
    resolved["value"] = json!("free");
    let outcome = step.run(&ctx(StateContainer::new()), resolved).await.unwrap();
    assert_eq!(outcome.ports, vec!["default"]);
    assert_eq!(outcome.output, Some(json!({ "matched_case": null })));
  }
}
