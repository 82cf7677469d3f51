use serde::{Deserialize, Serialize};

/// A directed connection from a source step's port to a target step.
///
/// The target port is informational; only the number of incoming edges
/// matters when deciding whether a step may run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
  pub source: String,
  pub source_port: String,
  pub target: String,
  pub target_port: String,
}
