use serde::{Deserialize, Serialize};

use crate::enums::JoinMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub step_id: String,
  /// Type tag looked up in the step registry (e.g. "set_state").
  #[serde(rename = "type")]
  pub step_type: String,
  /// Step configuration. String leaves may contain `{{path}}` references.
  #[serde(default = "empty_config")]
  pub config: serde_json::Value,
  #[serde(default)]
  pub join_mode: JoinMode,
}

impl StepDef {
  pub fn new(
    step_id: impl Into<String>,
    step_type: impl Into<String>,
    config: serde_json::Value,
  ) -> Self {
    Self {
      step_id: step_id.into(),
      step_type: step_type.into(),
      config,
      join_mode: JoinMode::default(),
    }
  }

  pub fn with_join_mode(mut self, join_mode: JoinMode) -> Self {
    self.join_mode = join_mode;
    self
  }
}

fn empty_config() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}
