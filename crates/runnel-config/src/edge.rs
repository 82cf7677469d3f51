use serde::{Deserialize, Serialize};

use crate::DEFAULT_PORT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub from: String,
  pub to: String,
  #[serde(default = "default_port")]
  pub from_port: String,
  #[serde(default = "default_port")]
  pub to_port: String,
}

impl EdgeDef {
  /// Edge between the default ports of two steps.
  pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      to: to.into(),
      from_port: default_port(),
      to_port: default_port(),
    }
  }

  /// Edge leaving a named port of the source step.
  pub fn from_port(from: impl Into<String>, port: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from_port: port.into(),
      ..Self::new(from, to)
    }
  }
}

fn default_port() -> String {
  DEFAULT_PORT.to_string()
}
