//! Runnel State
//!
//! The per-run data store shared by every step of a flow run, and the
//! resolver that binds `{{path}}` references in step configuration to it.
//!
//! ```text
//! StateContainer
//! ├── set("user.email", "a@b.c")       writes nested, creating mappings
//! ├── get("user")                      top-level key
//! └── get_nested("items.0.name")       keys and sequence indices
//!
//! interpolate::resolve(config, state)
//! └── "{{user.email}}" → "a@b.c", "{{count}}" → 3 (typed), "n={{count}}" → "n=3"
//! ```
//!
//! Every container operation takes the container's lock for the duration of
//! that single operation only, so concurrently running steps never observe a
//! partial write and never serialize on each other's I/O.

mod error;
pub mod interpolate;
mod path;
mod state;

pub use error::{ResolutionError, StateError};
pub use interpolate::{extract_refs, render_value, resolve, resolve_str};
pub use path::{PathSegment, StatePath};
pub use state::{StateContainer, StateSlot, StateType};
