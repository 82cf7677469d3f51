//! Lenient readers for resolved config values.
//!
//! A field written as `"{{wait}}"` resolves to whatever type the state holds,
//! and a field written as `"{{wait}}s"` resolves to a string, so numeric
//! fields accept numbers and numeric strings alike.

use serde::{Deserialize, Deserializer, de};
use serde_json::Value;

pub(crate) fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  as_number(&value).ok_or_else(|| de::Error::custom(format!("expected a number, got {}", value)))
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
}
