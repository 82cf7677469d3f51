//! Per-run arrival tracking for steps with gated join modes.

use std::collections::BTreeMap;

use runnel_config::JoinMode;
use runnel_step::StepStatus;
use tracing::debug;

/// What the driver should do with a step after an arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDecision {
  /// Start an invocation now.
  Run,
  /// Record the step SKIPPED without running it.
  Skip(String),
  /// Not enough arrivals yet.
  Wait,
  /// The step was already decided; the arrival is recorded and ignored.
  Ignore,
}

#[derive(Debug, Default)]
struct JoinState {
  expected: usize,
  arrivals: Vec<(String, StepStatus)>,
  decided: bool,
}

/// Counts inbound arrivals for one run.
///
/// NO_WAIT steps are never tracked: every arrival is decided on its own.
/// Every other mode accumulates arrivals until it can decide once.
#[derive(Debug, Default)]
pub struct JoinCoordinator {
  joins: BTreeMap<String, JoinState>,
}

impl JoinCoordinator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an arrival at `target` from `source` and decide.
  ///
  /// `expected` is the number of inbound edges of `target`.
  pub fn arrive(
    &mut self,
    target: &str,
    mode: JoinMode,
    expected: usize,
    source: &str,
    status: StepStatus,
  ) -> JoinDecision {
    if !mode.is_gated() {
      return match status {
        StepStatus::Skipped => JoinDecision::Skip(format!("upstream step '{}' was skipped", source)),
        _ => JoinDecision::Run,
      };
    }

    let join = self.joins.entry(target.to_string()).or_default();
    join.expected = expected;
    join.arrivals.push((source.to_string(), status));

    if join.decided {
      debug!(step_id = %target, %source, "late arrival ignored");
      return JoinDecision::Ignore;
    }

    let arrived = join.arrivals.len();
    let complete = arrived >= join.expected;
    let decision = match mode {
      JoinMode::NoWait => JoinDecision::Run,
      JoinMode::AllSuccess => {
        if !status.is_success() {
          JoinDecision::Skip(format!("upstream step '{}' did not succeed", source))
        } else if complete {
          JoinDecision::Run
        } else {
          JoinDecision::Wait
        }
      }
      JoinMode::AllDone => {
        if !complete {
          JoinDecision::Wait
        } else if join
          .arrivals
          .iter()
          .all(|(_, s)| *s == StepStatus::Skipped)
        {
          JoinDecision::Skip("every upstream step was skipped".to_string())
        } else {
          JoinDecision::Run
        }
      }
      JoinMode::FirstSuccess => {
        if status.is_success() {
          JoinDecision::Run
        } else if complete {
          JoinDecision::Skip("no upstream step succeeded".to_string())
        } else {
          JoinDecision::Wait
        }
      }
    };

    if decision != JoinDecision::Wait {
      join.decided = true;
    }
    debug!(step_id = %target, %source, %mode, arrived, expected, ?decision, "join arrival");
    decision
  }

  /// Undecided joins that have at least one arrival, in step id order.
  ///
  /// Once nothing is in flight, their remaining inbound edges can only
  /// come from branches that were never taken or from other partial joins.
  pub fn partial(&self) -> Vec<String> {
    self
      .joins
      .iter()
      .filter(|(_, join)| !join.decided && !join.arrivals.is_empty())
      .map(|(target, _)| target.clone())
      .collect()
  }

  /// Mark `target` decided without a further arrival.
  pub fn close(&mut self, target: &str) {
    if let Some(join) = self.joins.get_mut(target) {
      join.decided = true;
    }
  }

  /// Arrivals recorded for `target`, in delivery order.
  pub fn arrivals(&self, target: &str) -> &[(String, StepStatus)] {
    self
      .joins
      .get(target)
      .map(|join| join.arrivals.as_slice())
      .unwrap_or(&[])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use runnel_step::StepStatus::{Failed, Skipped, Succeeded};

  #[test]
  fn test_no_wait_is_untracked() {
    let mut joins = JoinCoordinator::new();
    assert_eq!(joins.arrive("c", JoinMode::NoWait, 2, "a", Succeeded), JoinDecision::Run);
    assert_eq!(joins.arrive("c", JoinMode::NoWait, 2, "b", Failed), JoinDecision::Run);
    assert!(matches!(
      joins.arrive("c", JoinMode::NoWait, 2, "b", Skipped),
      JoinDecision::Skip(_)
    ));
    assert!(joins.arrivals("c").is_empty());
    assert!(joins.partial().is_empty());
  }

  #[test]
  fn test_all_success() {
    let mut joins = JoinCoordinator::new();
    assert_eq!(joins.arrive("c", JoinMode::AllSuccess, 2, "a", Succeeded), JoinDecision::Wait);
    assert_eq!(joins.arrive("c", JoinMode::AllSuccess, 2, "b", Succeeded), JoinDecision::Run);

    let mut joins = JoinCoordinator::new();
    assert!(matches!(
      joins.arrive("c", JoinMode::AllSuccess, 2, "a", Failed),
      JoinDecision::Skip(_)
    ));
    assert_eq!(joins.arrive("c", JoinMode::AllSuccess, 2, "b", Succeeded), JoinDecision::Ignore);
    assert_eq!(joins.arrivals("c").len(), 2);
  }

  #[test]
  fn test_all_done() {
    let mut joins = JoinCoordinator::new();
    assert_eq!(joins.arrive("c", JoinMode::AllDone, 2, "a", Failed), JoinDecision::Wait);
    assert_eq!(joins.arrive("c", JoinMode::AllDone, 2, "b", Skipped), JoinDecision::Run);

    let mut joins = JoinCoordinator::new();
    joins.arrive("c", JoinMode::AllDone, 2, "a", Skipped);
    assert!(matches!(
      joins.arrive("c", JoinMode::AllDone, 2, "b", Skipped),
      JoinDecision::Skip(_)
    ));
  }

  #[test]
  fn test_first_success() {
    let mut joins = JoinCoordinator::new();
    assert_eq!(joins.arrive("c", JoinMode::FirstSuccess, 3, "a", Failed), JoinDecision::Wait);
    assert_eq!(joins.arrive("c", JoinMode::FirstSuccess, 3, "b", Succeeded), JoinDecision::Run);
    assert_eq!(joins.arrive("c", JoinMode::FirstSuccess, 3, "d", Succeeded), JoinDecision::Ignore);

    let mut joins = JoinCoordinator::new();
    joins.arrive("c", JoinMode::FirstSuccess, 2, "a", Failed);
    assert_eq!(
      joins.arrive("c", JoinMode::FirstSuccess, 2, "b", Skipped),
      JoinDecision::Skip("no upstream step succeeded".to_string())
    );
  }

  #[test]
  fn test_close_partial_join() {
    let mut joins = JoinCoordinator::new();
    joins.arrive("c", JoinMode::AllSuccess, 2, "a", Succeeded);
    joins.arrive("d", JoinMode::AllDone, 1, "a", Succeeded);
    joins.arrive("e", JoinMode::AllDone, 2, "a", Succeeded);
    assert_eq!(joins.partial(), vec!["c", "e"]);

    joins.close("c");
    assert_eq!(joins.partial(), vec!["e"]);
    assert_eq!(joins.arrive("c", JoinMode::AllSuccess, 2, "b", Succeeded), JoinDecision::Ignore);
  }
}
