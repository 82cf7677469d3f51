use std::collections::{HashMap, HashSet};

use runnel_config::{DEFAULT_PORT, FlowDef};
use runnel_step::{RegistryError, StepRegistry};
use tracing::debug;

use crate::edge::Edge;
use crate::error::FlowError;
use crate::graph::Graph;
use crate::node::StepNode;

/// A flow ready for execution. Immutable once handed to the engine.
#[derive(Debug, Clone)]
pub struct Flow {
  pub flow_id: String,
  pub name: String,
  steps: HashMap<String, StepNode>,
  graph: Graph,
}

impl Flow {
  pub fn new(flow_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      flow_id: flow_id.into(),
      name: name.into(),
      steps: HashMap::new(),
      graph: Graph::new(),
    }
  }

  /// Build a flow from its definition, instantiating steps via `registry`.
  pub fn from_def(def: &FlowDef, registry: &StepRegistry) -> Result<Self, FlowError> {
    let mut flow = Flow::new(&def.flow_id, &def.name);

    for step_def in &def.steps {
      let step = registry
        .create(&step_def.step_type, &step_def.config)
        .map_err(|e| match e {
          RegistryError::InvalidConfig { errors, .. } => FlowError::InvalidConfig {
            step_id: step_def.step_id.clone(),
            errors,
          },
          _ => FlowError::UnknownStepType {
            step_id: step_def.step_id.clone(),
            step_type: step_def.step_type.clone(),
          },
        })?;

      let node = StepNode::new(
        &step_def.step_id,
        &step_def.step_type,
        step,
        step_def.config.clone(),
      )
      .with_join_mode(step_def.join_mode);
      flow.add_step(node)?;
    }

    for edge in &def.edges {
      flow.add_edge(&edge.from, &edge.to, &edge.from_port, &edge.to_port)?;
    }

    debug!(
      flow_id = %flow.flow_id,
      steps = flow.steps.len(),
      edges = flow.graph.edges().len(),
      "flow built"
    );
    Ok(flow)
  }

  pub fn add_step(&mut self, node: StepNode) -> Result<(), FlowError> {
    if self.steps.contains_key(&node.step_id) {
      return Err(FlowError::DuplicateStep {
        step_id: node.step_id,
      });
    }
    if node.ports().is_empty() {
      return Err(FlowError::NoPorts {
        step_id: node.step_id,
      });
    }
    self.graph.add_node(&node.step_id);
    self.steps.insert(node.step_id.clone(), node);
    Ok(())
  }

  /// Connect `source_port` of `source` to `target`.
  pub fn add_edge(
    &mut self,
    source: &str,
    target: &str,
    source_port: &str,
    target_port: &str,
  ) -> Result<(), FlowError> {
    let source_node = self.steps.get(source).ok_or_else(|| FlowError::UnknownStep {
      step_id: source.to_string(),
    })?;
    if !self.steps.contains_key(target) {
      return Err(FlowError::UnknownStep {
        step_id: target.to_string(),
      });
    }
    if !source_node.has_port(source_port) {
      return Err(FlowError::UnknownPort {
        step_id: source.to_string(),
        port: source_port.to_string(),
        available: source_node.ports().to_vec(),
      });
    }

    self.graph.add_edge(Edge {
      source: source.to_string(),
      source_port: source_port.to_string(),
      target: target.to_string(),
      target_port: target_port.to_string(),
    });
    Ok(())
  }

  /// Connect the `default` ports of `source` and `target`.
  pub fn connect(&mut self, source: &str, target: &str) -> Result<(), FlowError> {
    self.add_edge(source, target, DEFAULT_PORT, DEFAULT_PORT)
  }

  pub fn step(&self, step_id: &str) -> Option<&StepNode> {
    self.steps.get(step_id)
  }

  /// Steps in the order they were added.
  pub fn steps(&self) -> impl Iterator<Item = &StepNode> {
    self.graph.nodes().iter().filter_map(|id| self.steps.get(id))
  }

  pub fn edges(&self) -> &[Edge] {
    self.graph.edges()
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn triggers(&self) -> impl Iterator<Item = &StepNode> {
    self.steps().filter(|s| s.is_trigger())
  }

  /// Every step with a path into `step_id`.
  pub fn ancestors(&self, step_id: &str) -> HashSet<String> {
    self.graph.ancestors(step_id)
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}
