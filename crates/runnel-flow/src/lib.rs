//! Runnel Flow
//!
//! The executable form of a flow: instantiated steps wired together by
//! port-labelled edges, with the adjacency indices the engine walks.
//!
//! Key differences from `runnel-config`:
//! - Every step is a live [`Step`](runnel_step::Step) built by the registry
//! - Edges are checked against existing steps and declared ports
//! - Incoming and outgoing edges per step are indexed
//!
//! Structural problems that do not prevent building (unreachable steps,
//! cycles, missing triggers) are reported by [`validate`].

mod edge;
mod error;
mod flow;
mod graph;
mod node;
mod validate;

pub use edge::Edge;
pub use error::FlowError;
pub use flow::Flow;
pub use graph::Graph;
pub use node::StepNode;
pub use validate::{Severity, ValidateOptions, ValidationError, has_errors, validate, validate_with};
