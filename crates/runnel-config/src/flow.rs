use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::error::ConfigError;
use crate::step::StepDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
  pub flow_id: String,
  pub name: String,
  pub steps: Vec<StepDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

impl FlowDef {
  /// Parse a flow definition from JSON text.
  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(text)?)
  }

  pub fn step(&self, step_id: &str) -> Option<&StepDef> {
    self.steps.iter().find(|s| s.step_id == step_id)
  }
}

impl FromStr for FlowDef {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::from_json(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{DEFAULT_PORT, JoinMode};
  use serde_json::json;

  #[test]
  fn test_parse_with_defaults() {
    let text = json!({
      "flow_id": "f1",
      "name": "Flow",
      "steps": [
        { "step_id": "t", "type": "trigger_manual" },
        { "step_id": "c", "type": "conditional", "join_mode": "all_done",
          "config": { "left": "{{role}}", "right": "admin" } }
      ],
      "edges": [
        { "from": "t", "to": "c" },
        { "from": "c", "from_port": "true", "to": "t" }
      ]
    })
    .to_string();

    let def: FlowDef = text.parse().unwrap();
    assert_eq!(def.steps.len(), 2);

    let trigger = def.step("t").unwrap();
    assert_eq!(trigger.config, json!({}));
    assert_eq!(trigger.join_mode, JoinMode::NoWait);
    assert_eq!(def.step("c").unwrap().join_mode, JoinMode::AllDone);

    assert_eq!(def.edges[0].from_port, DEFAULT_PORT);
    assert_eq!(def.edges[0].to_port, DEFAULT_PORT);
    assert_eq!(def.edges[1].from_port, "true");
  }

  #[test]
  fn test_parse_error() {
    let err = FlowDef::from_json("{\"flow_id\": 1}").unwrap_err();
    assert!(err.to_string().starts_with("failed to parse flow definition"));
  }

  #[test]
  fn test_missing_edges_defaults_empty() {
    let def = FlowDef::from_json(r#"{"flow_id":"f","name":"n","steps":[]}"#).unwrap();
    assert!(def.edges.is_empty());
  }
}
