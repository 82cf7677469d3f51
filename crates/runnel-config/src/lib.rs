//! Runnel Config
//!
//! This crate contains the serializable flow definition types for runnel.
//! These types describe a flow before its steps are instantiated from the
//! step registry and wired into a graph.
//!
//! Definitions are plain JSON documents:
//!
//! ```json
//! {
//!   "flow_id": "greet",
//!   "name": "Greeting",
//!   "steps": [
//!     { "step_id": "start", "type": "trigger_manual" },
//!     { "step_id": "save", "type": "set_state", "config": { "key": "greeting", "value": "hi {{name}}" } }
//!   ],
//!   "edges": [{ "from": "start", "to": "save" }]
//! }
//! ```

mod edge;
mod enums;
mod error;
mod flow;
mod step;

pub use edge::EdgeDef;
pub use enums::JoinMode;
pub use error::ConfigError;
pub use flow::FlowDef;
pub use step::StepDef;

/// Name of the port every step exposes unless it declares its own.
pub const DEFAULT_PORT: &str = "default";
