//! Runnel Engine
//!
//! Executes a [`Flow`](runnel_flow::Flow) from one of its trigger steps.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        FlowRunner                           │
//! │  - owns mpsc channel (sender + receiver)                    │
//! │  - seeds state from each payload, one run per payload       │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - run_with(trigger, options) → FlowRun (event stream)      │
//! │  - one driver task per run: joins, state merge, events      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Step invocations                        │
//! │  - concurrent tasks with their own cancellation token       │
//! │  - config resolved against the run's state before each run  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let flow = Flow::from_def(&def, &runnel_steps::builtin_registry())?;
//! let engine = Engine::with_notifier(flow, TracingNotifier);
//!
//! let mut run = engine.run_with("start", RunOptions::new().with_state(seed))?;
//! while let Some(event) = run.next_event().await {
//!   println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

mod engine;
mod error;
mod events;
mod join;
mod run;
mod runner;

pub use engine::Engine;
pub use error::EngineError;
pub use events::{ChannelNotifier, FlowEvent, FlowStatus, NoopNotifier, RunNotifier, TracingNotifier};
pub use join::{JoinCoordinator, JoinDecision};
pub use run::{FlowRun, RunOptions, RunReport};
pub use runner::{FlowRunner, Seeder};
