//! Run events and notifiers for observability.
//!
//! Every run yields its events through [`FlowRun`](crate::FlowRun). The
//! engine also hands each event to its [`RunNotifier`], so consumers that
//! are not holding the run (persistence, UIs, logs) can observe it too.

use std::fmt;

use chrono::{DateTime, Utc};
use runnel_step::{StepRunResult, StepStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Final status of a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
  Succeeded,
  Failed,
  Cancelled,
}

impl fmt::Display for FlowStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FlowStatus::Succeeded => "succeeded",
      FlowStatus::Failed => "failed",
      FlowStatus::Cancelled => "cancelled",
    };
    f.write_str(name)
  }
}

/// Events emitted during a flow run.
///
/// `FlowStarted` is always first and `FlowCompleted` always last. A step
/// that runs emits `StepStarted` before its `StepCompleted`; a step that is
/// skipped without running only emits `StepCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowEvent {
  FlowStarted {
    run_id: String,
    flow_id: String,
    flow_name: String,
    timestamp: DateTime<Utc>,
  },

  StepStarted {
    run_id: String,
    flow_id: String,
    step_id: String,
    step_type: String,
    invocation_id: String,
    timestamp: DateTime<Utc>,
  },

  StepCompleted {
    run_id: String,
    flow_id: String,
    step_id: String,
    result: StepRunResult,
    duration_ms: u64,
    /// Run state right after the result was recorded.
    state_snapshot: Map<String, Value>,
    timestamp: DateTime<Utc>,
  },

  FlowCompleted {
    run_id: String,
    flow_id: String,
    status: FlowStatus,
    timestamp: DateTime<Utc>,
  },
}

impl FlowEvent {
  pub fn run_id(&self) -> &str {
    match self {
      FlowEvent::FlowStarted { run_id, .. }
      | FlowEvent::StepStarted { run_id, .. }
      | FlowEvent::StepCompleted { run_id, .. }
      | FlowEvent::FlowCompleted { run_id, .. } => run_id,
    }
  }

  /// Step the event is about, if any.
  pub fn step_id(&self) -> Option<&str> {
    match self {
      FlowEvent::StepStarted { step_id, .. } | FlowEvent::StepCompleted { step_id, .. } => {
        Some(step_id)
      }
      _ => None,
    }
  }

  pub fn timestamp(&self) -> DateTime<Utc> {
    match self {
      FlowEvent::FlowStarted { timestamp, .. }
      | FlowEvent::StepStarted { timestamp, .. }
      | FlowEvent::StepCompleted { timestamp, .. }
      | FlowEvent::FlowCompleted { timestamp, .. } => *timestamp,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, FlowEvent::FlowCompleted { .. })
  }
}

/// Trait for receiving run events.
///
/// The engine calls `notify` for each event of every run it starts.
/// Implementations decide what to do with them (persist, broadcast, log,
/// ignore). `notify` is called from the run's driver task and must not
/// block.
pub trait RunNotifier: Send + Sync {
  fn notify(&self, event: FlowEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RunNotifier for NoopNotifier {
  fn notify(&self, _event: FlowEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run. Volume is at most two
  // events per step invocation.
  sender: mpsc::UnboundedSender<FlowEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<FlowEvent>) -> Self {
    Self { sender }
  }
}

impl RunNotifier for ChannelNotifier {
  fn notify(&self, event: FlowEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// A notifier that mirrors every event into the `tracing` log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl RunNotifier for TracingNotifier {
  fn notify(&self, event: FlowEvent) {
    match event {
      FlowEvent::FlowStarted {
        run_id,
        flow_id,
        flow_name,
        ..
      } => info!(%run_id, %flow_id, %flow_name, "flow_started"),
      FlowEvent::StepStarted {
        run_id,
        step_id,
        step_type,
        invocation_id,
        ..
      } => info!(%run_id, %step_id, %step_type, %invocation_id, "step_started"),
      FlowEvent::StepCompleted {
        run_id,
        step_id,
        result,
        duration_ms,
        ..
      } => match result.status {
        StepStatus::Failed => warn!(
          %run_id,
          %step_id,
          error = result.error_message().unwrap_or_default(),
          duration_ms,
          "step_failed"
        ),
        status => info!(%run_id, %step_id, %status, duration_ms, "step_completed"),
      },
      FlowEvent::FlowCompleted {
        run_id, status, ..
      } => info!(%run_id, %status, "flow_completed"),
    }
  }
}
