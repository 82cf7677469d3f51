//! Step type registry.
//!
//! Maps a type tag (the `type` field of a step definition) to a factory
//! that validates raw configuration and builds the step.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::FieldError;
use crate::error::RegistryError;
use crate::info::StepInfo;
use crate::step::Step;

/// Builds a step from its raw configuration, or reports field errors.
pub type StepFactory =
  Arc<dyn Fn(&Value) -> Result<Arc<dyn Step>, Vec<FieldError>> + Send + Sync>;

/// A registered step type.
#[derive(Clone)]
pub struct Registration {
  pub info: StepInfo,
  factory: StepFactory,
}

impl std::fmt::Debug for Registration {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Registration")
      .field("info", &self.info)
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
  entries: BTreeMap<String, Registration>,
}

impl StepRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<F>(
    &mut self,
    tag: impl Into<String>,
    info: StepInfo,
    factory: F,
  ) -> Result<(), RegistryError>
  where
    F: Fn(&Value) -> Result<Arc<dyn Step>, Vec<FieldError>> + Send + Sync + 'static,
  {
    let tag = tag.into();
    if self.entries.contains_key(&tag) {
      return Err(RegistryError::Duplicate { tag });
    }
    self.entries.insert(
      tag,
      Registration {
        info,
        factory: Arc::new(factory),
      },
    );
    Ok(())
  }

  /// Build a step of type `tag` from raw configuration.
  pub fn create(&self, tag: &str, config: &Value) -> Result<Arc<dyn Step>, RegistryError> {
    let registration = self
      .entries
      .get(tag)
      .ok_or_else(|| RegistryError::UnknownType {
        tag: tag.to_string(),
      })?;

    (registration.factory)(config).map_err(|errors| RegistryError::InvalidConfig {
      tag: tag.to_string(),
      errors,
    })
  }

  pub fn get(&self, tag: &str) -> Option<&Registration> {
    self.entries.get(tag)
  }

  pub fn contains(&self, tag: &str) -> bool {
    self.entries.contains_key(tag)
  }

  /// Registered tags with their metadata, ordered by tag.
  pub fn list(&self) -> impl Iterator<Item = (&str, &StepInfo)> {
    self
      .entries
      .iter()
      .map(|(tag, registration)| (tag.as_str(), &registration.info))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
