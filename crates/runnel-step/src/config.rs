//! Step configuration validation.
//!
//! Validation runs on the raw, unresolved configuration when a flow is built.
//! Fields that hold a `{{path}}` reference cannot be checked until run time,
//! so the helpers here accept them as-is.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;

/// A problem with one configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
  pub field: String,
  pub message: String,
}

impl FieldError {
  pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      message: message.into(),
    }
  }
}

impl fmt::Display for FieldError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.field, self.message)
  }
}

/// Whether `value` is a string containing a `{{...}}` reference.
pub fn is_template(value: &Value) -> bool {
  value
    .as_str()
    .and_then(|s| s.find("{{").map(|open| s[open..].contains("}}")))
    .unwrap_or(false)
}

/// Require `field` to be present and not null.
pub fn require_field<'a>(
  config: &'a Value,
  field: &str,
  errors: &mut Vec<FieldError>,
) -> Option<&'a Value> {
  match config.get(field) {
    Some(Value::Null) | None => {
      errors.push(FieldError::new(field, "field is required"));
      None
    }
    Some(value) => Some(value),
  }
}

/// Require `field` to be a non-empty string.
pub fn require_str<'a>(
  config: &'a Value,
  field: &str,
  errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
  let value = require_field(config, field, errors)?;
  match value.as_str() {
    Some("") => {
      errors.push(FieldError::new(field, "must not be empty"));
      None
    }
    Some(s) => Some(s),
    None => {
      errors.push(FieldError::new(field, "must be a string"));
      None
    }
  }
}

/// Check an optional numeric `field` lies within `min..=max`.
pub fn check_range(config: &Value, field: &str, min: f64, max: f64, errors: &mut Vec<FieldError>) {
  let Some(value) = config.get(field) else {
    return;
  };
  if value.is_null() || is_template(value) {
    return;
  }
  match value.as_f64() {
    Some(n) if n >= min && n <= max => {}
    Some(_) => errors.push(FieldError::new(
      field,
      format!("must be between {} and {}", min, max),
    )),
    None => errors.push(FieldError::new(field, "must be a number")),
  }
}

/// Deserialize a resolved configuration into a step's typed config.
pub fn parse_config<T: DeserializeOwned>(config: Value) -> Result<T, StepError> {
  serde_json::from_value(config).map_err(|e| StepError::InvalidConfig {
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_is_template() {
    assert!(is_template(&json!("{{count}}")));
    assert!(is_template(&json!("n = {{ count }}")));
    assert!(!is_template(&json!("{{count")));
    assert!(!is_template(&json!("plain")));
    assert!(!is_template(&json!(5)));
  }

  #[test]
  fn test_require_str() {
    let config = json!({ "key": "x", "empty": "", "num": 1, "nil": null });
    let mut errors = Vec::new();
    assert_eq!(require_str(&config, "key", &mut errors), Some("x"));
    assert!(errors.is_empty());

    assert!(require_str(&config, "empty", &mut errors).is_none());
    assert!(require_str(&config, "num", &mut errors).is_none());
    assert!(require_str(&config, "nil", &mut errors).is_none());
    assert!(require_str(&config, "missing", &mut errors).is_none());

    let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["empty", "num", "nil", "missing"]);
  }

  #[test]
  fn test_check_range_allows_templates() {
    let mut errors = Vec::new();
    check_range(&json!({ "s": 10 }), "s", 0.0, 300.0, &mut errors);
    check_range(&json!({ "s": "{{wait}}" }), "s", 0.0, 300.0, &mut errors);
    check_range(&json!({}), "s", 0.0, 300.0, &mut errors);
    assert!(errors.is_empty());

    check_range(&json!({ "s": 301 }), "s", 0.0, 300.0, &mut errors);
    check_range(&json!({ "s": "soon" }), "s", 0.0, 300.0, &mut errors);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].message, "must be between 0 and 300");
  }

  #[test]
  fn test_parse_config() {
    #[derive(Deserialize)]
    struct Config {
      key: String,
    }

    let parsed: Config = parse_config(json!({ "key": "a" })).unwrap();
    assert_eq!(parsed.key, "a");

    let err = parse_config::<Config>(json!({ "key": 1 })).err().unwrap();
    assert_eq!(err.code(), "invalid_config");
  }
}
