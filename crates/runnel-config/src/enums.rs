use std::fmt;

use serde::{Deserialize, Serialize};

/// How a step with several inbound edges decides when to execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
  /// Every arrival triggers its own execution.
  #[default]
  NoWait,
  /// Wait for all inbound edges; run only if all of them succeeded.
  AllSuccess,
  /// Wait for all inbound edges, whatever their outcome.
  AllDone,
  /// Run once, on the first successful arrival.
  FirstSuccess,
}

impl JoinMode {
  /// Whether arrivals at this step are counted by the join coordinator.
  pub fn is_gated(self) -> bool {
    !matches!(self, JoinMode::NoWait)
  }
}

impl fmt::Display for JoinMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      JoinMode::NoWait => "no_wait",
      JoinMode::AllSuccess => "all_success",
      JoinMode::AllDone => "all_done",
      JoinMode::FirstSuccess => "first_success",
    };
    f.write_str(s)
  }
}
