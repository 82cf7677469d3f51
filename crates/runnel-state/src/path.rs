//! Dotted state paths: `segment ('.' segment)*`.

use std::fmt;
use std::str::FromStr;

use crate::error::StateError;

/// One segment of a [`StatePath`].
///
/// Numeric segments index into sequences; against a mapping they are used as
/// plain keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
  text: String,
  index: Option<usize>,
}

impl PathSegment {
  pub fn as_key(&self) -> &str {
    &self.text
  }

  pub fn as_index(&self) -> Option<usize> {
    self.index
  }
}

/// A parsed, validated state path such as `user.profile.email` or `items.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePath {
  raw: String,
  segments: Vec<PathSegment>,
}

impl StatePath {
  pub fn parse(raw: &str) -> Result<Self, StateError> {
    let invalid = |reason: &str| StateError::InvalidPath {
      path: raw.to_string(),
      reason: reason.to_string(),
    };

    if raw.is_empty() {
      return Err(invalid("path is empty"));
    }

    let mut segments = Vec::new();
    for part in raw.split('.') {
      if part.is_empty() {
        return Err(invalid("empty segment"));
      }

      if part.bytes().all(|b| b.is_ascii_digit()) {
        let index = part
          .parse::<usize>()
          .map_err(|_| invalid("index out of range"))?;
        segments.push(PathSegment {
          text: part.to_string(),
          index: Some(index),
        });
        continue;
      }

      if !is_identifier(part) {
        return Err(invalid(&format!("'{}' is not an identifier or index", part)));
      }

      segments.push(PathSegment {
        text: part.to_string(),
        index: None,
      });
    }

    Ok(Self {
      raw: raw.to_string(),
      segments,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn segments(&self) -> &[PathSegment] {
    &self.segments
  }

  /// The top-level key this path starts at.
  pub fn root(&self) -> &str {
    // parse() guarantees at least one segment
    self.segments[0].as_key()
  }

  pub fn is_root_only(&self) -> bool {
    self.segments.len() == 1
  }
}

impl FromStr for StatePath {
  type Err = StateError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for StatePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

fn is_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
