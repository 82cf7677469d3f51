use std::fmt;

use runnel_state::StateType;
use serde::{Deserialize, Serialize};

/// Broad grouping of step types, used for listings and to tell triggers
/// apart from everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
  Trigger,
  Logic,
  Data,
  Integration,
  Communication,
  Utility,
}

impl fmt::Display for StepCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StepCategory::Trigger => "trigger",
      StepCategory::Logic => "logic",
      StepCategory::Data => "data",
      StepCategory::Integration => "integration",
      StepCategory::Communication => "communication",
      StepCategory::Utility => "utility",
    };
    f.write_str(name)
  }
}

/// Descriptive metadata for a step type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
  pub name: String,
  pub description: String,
  pub category: StepCategory,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  /// Display colour as a hex string, e.g. `#2196F3`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
}

impl StepInfo {
  pub fn new(
    name: impl Into<String>,
    description: impl Into<String>,
    category: StepCategory,
  ) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
      category,
      icon: None,
      color: None,
    }
  }

  pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
    self.icon = Some(icon.into());
    self
  }

  pub fn with_color(mut self, color: impl Into<String>) -> Self {
    self.color = Some(color.into());
    self
  }
}

/// A top-level state key a step writes when it succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
  pub key: String,
  #[serde(rename = "type")]
  pub value_type: StateType,
  #[serde(default)]
  pub description: String,
}

impl Output {
  pub fn new(key: impl Into<String>, value_type: StateType, description: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      value_type,
      description: description.into(),
    }
  }
}
