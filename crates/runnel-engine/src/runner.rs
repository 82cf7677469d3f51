//! Flow runner with channel-based triggering.
//!
//! The `FlowRunner` owns an mpsc channel for receiving trigger payloads and
//! starts one run per payload.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{FlowStatus, NoopNotifier, RunNotifier};
use crate::run::{RunOptions, RunReport};

/// Builds a run's initial state from the trigger's type tag, its raw
/// config and the received payload.
pub type Seeder = Arc<dyn Fn(&str, &Value, Value) -> Map<String, Value> + Send + Sync>;

/// A runner that executes a flow in response to trigger payloads.
///
/// # Usage
///
/// ```ignore
/// let runner = FlowRunner::new(engine, "webhook")
///   .with_seeder(Arc::new(runnel_steps::seed::for_trigger));
///
/// // Get sender for external triggers (webhooks, UI, etc.)
/// let sender = runner.sender();
///
/// // Start the execution loop
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct FlowRunner<N: RunNotifier = NoopNotifier> {
  sender: mpsc::Sender<Value>,
  receiver: mpsc::Receiver<Value>,
  engine: Arc<Engine<N>>,
  trigger_id: String,
  seeder: Seeder,
}

impl<N: RunNotifier + 'static> FlowRunner<N> {
  pub fn new(engine: Arc<Engine<N>>, trigger_id: impl Into<String>) -> Self {
    Self::with_buffer_size(engine, trigger_id, 100)
  }

  pub fn with_buffer_size(
    engine: Arc<Engine<N>>,
    trigger_id: impl Into<String>,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      engine,
      trigger_id: trigger_id.into(),
      seeder: Arc::new(payload_state),
    }
  }

  /// Replace how payloads become initial state.
  pub fn with_seeder(mut self, seeder: Seeder) -> Self {
    self.seeder = seeder;
    self
  }

  /// Get a sender handle for triggering runs.
  pub fn sender(&self) -> mpsc::Sender<Value> {
    self.sender.clone()
  }

  /// Trigger a run with the given payload through the channel.
  pub async fn run(&self, payload: Value) -> Result<(), EngineError> {
    self
      .sender
      .send(payload)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  pub fn engine(&self) -> &Engine<N> {
    &self.engine
  }

  /// Start the execution loop.
  ///
  /// Runs until the cancellation token is triggered or the channel closes.
  /// Each received payload seeds a fresh state and runs the flow to
  /// completion before the next one is taken.
  pub async fn start(self, cancel: CancellationToken) -> Result<(), EngineError> {
    // The runner's own sender is dropped here so the channel can close.
    let FlowRunner {
      mut receiver,
      engine,
      trigger_id,
      seeder,
      ..
    } = self;
    let flow_id = engine.flow().flow_id.clone();
    info!(%flow_id, trigger = %trigger_id, "starting flow runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(%flow_id, "flow runner cancelled");
          break;
        }
        payload = receiver.recv() => {
          let Some(payload) = payload else {
            info!(%flow_id, "flow runner channel closed");
            break;
          };
          let report = execute(&engine, &trigger_id, &seeder, payload, cancel.child_token()).await?;
          match report.status {
            FlowStatus::Failed => error!(%flow_id, run_id = %report.run_id, "flow run failed"),
            status => info!(
              %flow_id,
              run_id = %report.run_id,
              %status,
              steps = report.results.len(),
              "flow run completed"
            ),
          }
        }
      }
    }

    Ok(())
  }

  /// Execute a single run (without the loop).
  pub async fn execute_once(
    &self,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    execute(&self.engine, &self.trigger_id, &self.seeder, payload, cancel).await
  }
}

async fn execute<N: RunNotifier + 'static>(
  engine: &Engine<N>,
  trigger_id: &str,
  seeder: &Seeder,
  payload: Value,
  cancel: CancellationToken,
) -> Result<RunReport, EngineError> {
  let trigger = engine
    .flow()
    .step(trigger_id)
    .ok_or_else(|| EngineError::UnknownStep {
      step_id: trigger_id.to_string(),
    })?;
  let initial_state = seeder(&trigger.step_type, &trigger.config, payload);
  let options = RunOptions::new()
    .with_state(initial_state)
    .with_cancel(cancel);
  Ok(engine.run_with(trigger_id, options)?.wait().await)
}

/// Object payloads become top-level state; anything else lands under
/// `payload`.
fn payload_state(_tag: &str, _config: &Value, payload: Value) -> Map<String, Value> {
  match payload {
    Value::Object(map) => map,
    Value::Null => Map::new(),
    other => {
      let mut state = Map::new();
      state.insert("payload".to_string(), other);
      state
    }
  }
}
