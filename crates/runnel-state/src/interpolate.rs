//! `{{path}}` reference resolution.
//!
//! A string that is exactly one reference (surrounding whitespace aside)
//! resolves to the referenced value with its type intact. Any other string
//! has each reference replaced by the rendered text of its value. Mappings
//! and sequences are walked element-wise; other leaves pass through.
//!
//! An opening `{{` with no closing `}}` is literal text.

use serde_json::Value;

use crate::error::{ResolutionError, StateError};
use crate::path::StatePath;
use crate::state::StateContainer;

enum Piece<'a> {
  Text(&'a str),
  Ref(&'a str),
}

fn scan(template: &str) -> Vec<Piece<'_>> {
  let mut pieces = Vec::new();
  let mut rest = template;

  while let Some(open) = rest.find("{{") {
    let after_open = &rest[open + 2..];
    let Some(close) = after_open.find("}}") else {
      break;
    };
    if open > 0 {
      pieces.push(Piece::Text(&rest[..open]));
    }
    pieces.push(Piece::Ref(after_open[..close].trim()));
    rest = &after_open[close + 2..];
  }

  if !rest.is_empty() {
    pieces.push(Piece::Text(rest));
  }
  pieces
}

fn lookup(path: &str, state: &StateContainer) -> Result<Value, ResolutionError> {
  let parsed = StatePath::parse(path).map_err(|e| ResolutionError::InvalidReference {
    path: path.to_string(),
    reason: match e {
      StateError::InvalidPath { reason, .. } => reason,
      other => other.to_string(),
    },
  })?;

  state
    .lookup(&parsed)
    .map_err(|_| ResolutionError::Unresolved {
      path: path.to_string(),
    })
}

/// Resolve every reference inside `value` against `state`.
pub fn resolve(value: &Value, state: &StateContainer) -> Result<Value, ResolutionError> {
  match value {
    Value::String(s) => resolve_str(s, state),
    Value::Array(items) => items
      .iter()
      .map(|item| resolve(item, state))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Value::Object(map) => {
      let mut resolved = serde_json::Map::with_capacity(map.len());
      for (key, item) in map {
        resolved.insert(key.clone(), resolve(item, state)?);
      }
      Ok(Value::Object(resolved))
    }
    other => Ok(other.clone()),
  }
}

/// Resolve a single template string.
pub fn resolve_str(template: &str, state: &StateContainer) -> Result<Value, ResolutionError> {
  let pieces = scan(template.trim());
  if let [Piece::Ref(path)] = pieces.as_slice() {
    return lookup(path, state);
  }

  let pieces = scan(template);
  if !pieces.iter().any(|p| matches!(p, Piece::Ref(_))) {
    return Ok(Value::String(template.to_string()));
  }

  let mut out = String::with_capacity(template.len());
  for piece in pieces {
    match piece {
      Piece::Text(text) => out.push_str(text),
      Piece::Ref(path) => out.push_str(&render_value(&lookup(path, state)?)),
    }
  }
  Ok(Value::String(out))
}

/// Text form of a value inside a larger template.
pub fn render_value(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::Array(_) | Value::Object(_) => value.to_string(),
  }
}

/// Every reference path inside `value`, in first-seen order, deduplicated.
pub fn extract_refs(value: &Value) -> Vec<String> {
  let mut refs = Vec::new();
  collect_refs(value, &mut refs);
  refs
}

fn collect_refs(value: &Value, refs: &mut Vec<String>) {
  match value {
    Value::String(s) => {
      for piece in scan(s) {
        if let Piece::Ref(path) = piece {
          if !refs.iter().any(|r| r == path) {
            refs.push(path.to_string());
          }
        }
      }
    }
    Value::Array(items) => items.iter().for_each(|item| collect_refs(item, refs)),
    Value::Object(map) => map.values().for_each(|item| collect_refs(item, refs)),
    _ => {}
  }
}
