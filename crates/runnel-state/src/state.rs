use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::StateError;
use crate::interpolate::render_value;
use crate::path::{PathSegment, StatePath};

/// Declared type of a top-level state slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
  #[default]
  Any,
  Text,
  Number,
  Boolean,
  Object,
  Array,
}

impl fmt::Display for StateType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StateType::Any => "any",
      StateType::Text => "text",
      StateType::Number => "number",
      StateType::Boolean => "boolean",
      StateType::Object => "object",
      StateType::Array => "array",
    };
    f.write_str(name)
  }
}

/// A typed top-level state key. Values written to it are cast to its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSlot {
  pub name: String,
  #[serde(rename = "type")]
  pub slot_type: StateType,
  #[serde(default)]
  pub description: String,
}

impl StateSlot {
  pub fn new(name: impl Into<String>, slot_type: StateType) -> Self {
    Self {
      name: name.into(),
      slot_type,
      description: String::new(),
    }
  }

  pub fn cast(&self, value: Value) -> Result<Value, StateError> {
    let fail = |message: String| StateError::Cast {
      slot: self.name.clone(),
      expected: self.slot_type.to_string(),
      message,
    };

    // Any slot may be cleared.
    if value.is_null() {
      return Ok(value);
    }

    match self.slot_type {
      StateType::Any => Ok(value),
      StateType::Text => match value {
        Value::String(_) => Ok(value),
        other => Ok(Value::String(render_value(&other))),
      },
      StateType::Number => match value {
        Value::Number(_) => Ok(value),
        Value::Bool(b) => Ok(Value::from(u8::from(b))),
        Value::String(ref s) => {
          let trimmed = s.trim();
          if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Value::from(i));
          }
          trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| fail(format!("'{}' is not a number", s)))
        }
        other => Err(fail(format!("got {}", type_name(&other)))),
      },
      StateType::Boolean => match value {
        Value::Bool(_) => Ok(value),
        Value::Number(ref n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
          "true" | "1" | "yes" => Ok(Value::Bool(true)),
          "false" | "0" | "no" | "" => Ok(Value::Bool(false)),
          _ => Err(fail(format!("'{}' is not a boolean", s))),
        },
        other => Err(fail(format!("got {}", type_name(&other)))),
      },
      StateType::Object => match value {
        Value::Object(_) => Ok(value),
        Value::String(ref s) => match serde_json::from_str::<Value>(s) {
          Ok(parsed @ Value::Object(_)) => Ok(parsed),
          _ => Err(fail("string does not contain a JSON object".to_string())),
        },
        other => Err(fail(format!("got {}", type_name(&other)))),
      },
      StateType::Array => match value {
        Value::Array(_) => Ok(value),
        Value::String(ref s) => match serde_json::from_str::<Value>(s) {
          Ok(parsed @ Value::Array(_)) => Ok(parsed),
          _ => Err(fail("string does not contain a JSON array".to_string())),
        },
        other => Err(fail(format!("got {}", type_name(&other)))),
      },
    }
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "text",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[derive(Debug, Default)]
struct Inner {
  slots: HashMap<String, StateSlot>,
  values: Map<String, Value>,
}

/// Path-addressable store shared by all steps of one flow run.
///
/// Each call holds the internal lock only for its own duration.
#[derive(Debug, Default)]
pub struct StateContainer {
  inner: Mutex<Inner>,
}

impl StateContainer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a container seeded with top-level values.
  pub fn from_values(values: Map<String, Value>) -> Self {
    Self {
      inner: Mutex::new(Inner {
        slots: HashMap::new(),
        values,
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    // A panicking step must not take the run's state down with it.
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Declare a typed top-level slot. An existing value is re-cast.
  pub fn define(&self, slot: StateSlot) -> Result<(), StateError> {
    let mut inner = self.lock();
    if let Some(existing) = inner.values.remove(&slot.name) {
      let cast = slot.cast(existing)?;
      inner.values.insert(slot.name.clone(), cast);
    }
    inner.slots.insert(slot.name.clone(), slot);
    Ok(())
  }

  /// Write `value` at a dotted path, creating intermediate mappings.
  ///
  /// Single-segment paths naming a defined slot are cast to the slot's type.
  /// A numeric segment addresses an existing sequence element; an index equal
  /// to the sequence length appends.
  pub fn set(&self, path: &str, value: Value) -> Result<(), StateError> {
    let parsed = StatePath::parse(path)?;
    let mut inner = self.lock();
    let Inner { slots, values } = &mut *inner;
    write_path(values, slots, &parsed, value)?;
    trace!(path = %path, "state set");
    Ok(())
  }

  /// Value at a dotted path, following mappings only.
  ///
  /// Reads back what `set` wrote at the same path. Stored `null` counts as
  /// present. Use [`get_nested`](Self::get_nested) to index into sequences.
  pub fn get(&self, path: &str) -> Result<Value, StateError> {
    let parsed = StatePath::parse(path)?;
    let not_found = || StateError::NotFound {
      path: path.to_string(),
    };

    let inner = self.lock();
    let mut current = inner.values.get(parsed.root()).ok_or_else(not_found)?;
    for segment in &parsed.segments()[1..] {
      current = current
        .as_object()
        .and_then(|map| map.get(segment.as_key()))
        .ok_or_else(not_found)?;
    }
    Ok(current.clone())
  }

  /// Segment-by-segment lookup through mappings and sequences.
  pub fn get_nested(&self, path: &str) -> Result<Value, StateError> {
    let parsed = StatePath::parse(path)?;
    self.lookup(&parsed)
  }

  pub(crate) fn lookup(&self, path: &StatePath) -> Result<Value, StateError> {
    let not_found = || StateError::NotFound {
      path: path.as_str().to_string(),
    };

    let inner = self.lock();
    let mut current = inner.values.get(path.root()).ok_or_else(not_found)?;
    for segment in &path.segments()[1..] {
      current = step_into(current, segment).ok_or_else(not_found)?;
    }
    Ok(current.clone())
  }

  pub fn contains(&self, path: &str) -> bool {
    self.get_nested(path).is_ok()
  }

  /// Write every entry of `values`, each key read as a path.
  ///
  /// All or nothing: if any write fails, the container is left as it was.
  pub fn merge(&self, values: Map<String, Value>) -> Result<(), StateError> {
    let mut inner = self.lock();
    let mut staged = inner.values.clone();
    for (key, value) in values {
      let parsed = StatePath::parse(&key)?;
      write_path(&mut staged, &inner.slots, &parsed, value)?;
    }
    inner.values = staged;
    trace!("state merged");
    Ok(())
  }

  pub fn snapshot(&self) -> Map<String, Value> {
    self.lock().values.clone()
  }

  pub fn len(&self) -> usize {
    self.lock().values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().values.is_empty()
  }
}

fn write_path(
  values: &mut Map<String, Value>,
  slots: &HashMap<String, StateSlot>,
  path: &StatePath,
  value: Value,
) -> Result<(), StateError> {
  let root = path.root();
  if path.is_root_only() {
    let value = match slots.get(root) {
      Some(slot) => slot.cast(value)?,
      None => value,
    };
    values.insert(root.to_string(), value);
    return Ok(());
  }

  // Write into a copy so a failed write leaves `values` untouched.
  let mut target = values.get(root).cloned().unwrap_or(Value::Null);
  write_at(&mut target, &path.segments()[1..], value, path.as_str())?;
  values.insert(root.to_string(), target);
  Ok(())
}

fn step_into<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
  match value {
    Value::Object(map) => map.get(segment.as_key()),
    Value::Array(items) => segment.as_index().and_then(|i| items.get(i)),
    _ => None,
  }
}

fn write_at(
  target: &mut Value,
  segments: &[PathSegment],
  value: Value,
  path: &str,
) -> Result<(), StateError> {
  let Some((segment, rest)) = segments.split_first() else {
    *target = value;
    return Ok(());
  };

  if target.is_null() {
    *target = Value::Object(Map::new());
  }

  match target {
    Value::Object(map) => {
      let child = map
        .entry(segment.as_key().to_string())
        .or_insert(Value::Null);
      write_at(child, rest, value, path)
    }
    Value::Array(items) => {
      let Some(index) = segment.as_index() else {
        return Err(StateError::NotAContainer {
          path: path.to_string(),
          segment: segment.as_key().to_string(),
        });
      };
      let len = items.len();
      if index == len {
        items.push(Value::Null);
      }
      match items.get_mut(index) {
        Some(child) => write_at(child, rest, value, path),
        None => Err(StateError::IndexOutOfBounds {
          path: path.to_string(),
          index,
          len,
        }),
      }
    }
    _ => Err(StateError::NotAContainer {
      path: path.to_string(),
      segment: segment.as_key().to_string(),
    }),
  }
}
