use std::collections::{HashMap, HashSet, VecDeque};

use crate::edge::Edge;

/// Graph structure for traversal and analysis.
///
/// Steps are kept in insertion order so every traversal is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  nodes: Vec<String>,
  edges: Vec<Edge>,
  /// step_id -> indices of edges leaving the step.
  outgoing: HashMap<String, Vec<usize>>,
  /// step_id -> indices of edges entering the step.
  incoming: HashMap<String, Vec<usize>>,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn add_node(&mut self, step_id: &str) {
    self.nodes.push(step_id.to_string());
    self.outgoing.entry(step_id.to_string()).or_default();
    self.incoming.entry(step_id.to_string()).or_default();
  }

  pub(crate) fn add_edge(&mut self, edge: Edge) {
    let index = self.edges.len();
    self
      .outgoing
      .entry(edge.source.clone())
      .or_default()
      .push(index);
    self
      .incoming
      .entry(edge.target.clone())
      .or_default()
      .push(index);
    self.edges.push(edge);
  }

  pub fn nodes(&self) -> &[String] {
    &self.nodes
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  /// Edges leaving a step, in the order they were added.
  pub fn outgoing(&self, step_id: &str) -> impl Iterator<Item = &Edge> {
    self
      .outgoing
      .get(step_id)
      .into_iter()
      .flatten()
      .map(|&i| &self.edges[i])
  }

  /// Edges entering a step, in the order they were added.
  pub fn incoming(&self, step_id: &str) -> impl Iterator<Item = &Edge> {
    self
      .incoming
      .get(step_id)
      .into_iter()
      .flatten()
      .map(|&i| &self.edges[i])
  }

  /// Number of edges entering a step, counting parallel edges separately.
  pub fn in_degree(&self, step_id: &str) -> usize {
    self.incoming.get(step_id).map_or(0, Vec::len)
  }

  /// Get downstream steps for a given step.
  pub fn downstream(&self, step_id: &str) -> Vec<&str> {
    dedup(self.outgoing(step_id).map(|e| e.target.as_str()))
  }

  /// Get upstream steps for a given step.
  pub fn upstream(&self, step_id: &str) -> Vec<&str> {
    dedup(self.incoming(step_id).map(|e| e.source.as_str()))
  }

  /// Steps with no incoming edges.
  pub fn entry_points(&self) -> Vec<&str> {
    self
      .nodes
      .iter()
      .filter(|id| self.in_degree(id) == 0)
      .map(String::as_str)
      .collect()
  }

  /// Check if a step has multiple incoming edges.
  pub fn is_join_point(&self, step_id: &str) -> bool {
    self.in_degree(step_id) > 1
  }

  /// Every step with a path to `step_id`, excluding `step_id` itself unless
  /// it lies on a cycle.
  pub fn ancestors(&self, step_id: &str) -> HashSet<String> {
    self.walk([step_id], |graph, id| graph.upstream(id))
  }

  /// Every step reachable from `starts`, including the starts themselves.
  pub fn reachable_from<'a>(&self, starts: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    let starts: Vec<&str> = starts.into_iter().collect();
    let mut seen = self.walk(starts.iter().copied(), |graph, id| graph.downstream(id));
    seen.extend(starts.iter().map(|s| s.to_string()));
    seen
  }

  fn walk<'a, F>(&'a self, starts: impl IntoIterator<Item = &'a str>, next: F) -> HashSet<String>
  where
    F: Fn(&'a Self, &str) -> Vec<&'a str>,
  {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = starts.into_iter().collect();
    while let Some(id) = queue.pop_front() {
      for neighbor in next(self, id) {
        if seen.insert(neighbor.to_string()) {
          queue.push_back(neighbor);
        }
      }
    }
    seen
  }

  /// Find steps that close a cycle, using DFS.
  ///
  /// Each returned step is the target of a back edge; a flow without
  /// cycles yields an empty list.
  pub fn cycle_entries(&self) -> Vec<String> {
    // 0 = unvisited, 1 = in progress, 2 = done
    let mut color: HashMap<&str, u8> = self.nodes.iter().map(|id| (id.as_str(), 0u8)).collect();
    let mut found: Vec<String> = Vec::new();

    fn dfs<'a>(
      graph: &'a Graph,
      node: &'a str,
      color: &mut HashMap<&'a str, u8>,
      found: &mut Vec<String>,
    ) {
      color.insert(node, 1);

      for neighbor in graph.downstream(node) {
        match color.get(neighbor) {
          Some(1) => {
            // Back edge = cycle
            if !found.iter().any(|f| f == neighbor) {
              found.push(neighbor.to_string());
            }
          }
          Some(0) => dfs(graph, neighbor, color, found),
          _ => {}
        }
      }

      color.insert(node, 2);
    }

    for node_id in &self.nodes {
      if color.get(node_id.as_str()) == Some(&0) {
        dfs(self, node_id.as_str(), &mut color, &mut found);
      }
    }

    found
  }
}

fn dedup<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
  let mut out: Vec<&str> = Vec::new();
  for id in ids {
    if !out.contains(&id) {
      out.push(id);
    }
  }
  out
}
