//! Runnel Step
//!
//! The contract between the engine and the units of work it schedules.
//!
//! A [`Step`] is created once per flow from its raw configuration by a
//! factory held in the [`StepRegistry`]. At run time the engine resolves the
//! `{{path}}` references in that configuration against the run's state and
//! hands the resolved value to [`Step::run`], which reports a [`StepOutcome`].
//! The engine turns outcomes (and errors, panics, cancellations) into
//! [`StepRunResult`] records.

mod config;
mod error;
mod info;
mod outcome;
mod registry;
mod step;

pub use config::{FieldError, check_range, is_template, parse_config, require_field, require_str};
pub use error::{RegistryError, StepError};
pub use info::{Output, StepCategory, StepInfo};
pub use outcome::{StepFailure, StepOutcome, StepRunResult, StepStatus};
pub use registry::{Registration, StepFactory, StepRegistry};
pub use step::{Step, StepContext};
