//! Initial state for runs started by a trigger.
//!
//! Each helper builds the top-level state entries that the matching trigger
//! step declares as its outputs. [`for_trigger`] picks the helper from a
//! trigger's type tag and a free-form JSON payload.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

fn iso(time: DateTime<Utc>) -> Value {
  Value::String(time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn webhook(
  body: Value,
  headers: Map<String, Value>,
  method: &str,
  query: Map<String, Value>,
) -> Map<String, Value> {
  let mut state = Map::new();
  state.insert("body".to_string(), body);
  state.insert("headers".to_string(), Value::Object(headers));
  state.insert("method".to_string(), Value::String(method.to_uppercase()));
  state.insert("query".to_string(), Value::Object(query));
  state
}

pub fn schedule(scheduled_time: DateTime<Utc>, actual_time: DateTime<Utc>) -> Map<String, Value> {
  let mut state = Map::new();
  state.insert("scheduled_time".to_string(), iso(scheduled_time));
  state.insert("actual_time".to_string(), iso(actual_time));
  state
}

pub fn event(event_name: &str, event_data: Value, timestamp: DateTime<Utc>) -> Map<String, Value> {
  let mut state = Map::new();
  state.insert("event_name".to_string(), Value::String(event_name.to_string()));
  state.insert("event_data".to_string(), event_data);
  state.insert("event_timestamp".to_string(), iso(timestamp));
  state
}

/// Seed a conversation, generating an id when none is given.
pub fn conversation(conversation_id: Option<String>) -> Map<String, Value> {
  let id = conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
  let mut state = Map::new();
  state.insert("conversation_id".to_string(), Value::String(id));
  state
}

fn object(value: Option<&Value>) -> Map<String, Value> {
  match value {
    Some(Value::Object(map)) => map.clone(),
    _ => Map::new(),
  }
}

/// Build the initial state for a run started at a trigger of type `tag`.
///
/// Unknown tags and manual triggers take an object payload as-is; any other
/// non-null payload is stored under `payload`.
pub fn for_trigger(tag: &str, config: &Value, payload: Value) -> Map<String, Value> {
  let now = Utc::now();
  match tag {
    "trigger_webhook" => {
      let default_method = config
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("POST");
      let is_request = payload.as_object().is_some_and(|p| {
        ["body", "headers", "method", "query"]
          .iter()
          .any(|k| p.contains_key(*k))
      });
      if is_request {
        let method = payload
          .get("method")
          .and_then(Value::as_str)
          .unwrap_or(default_method)
          .to_string();
        webhook(
          payload.get("body").cloned().unwrap_or(Value::Null),
          object(payload.get("headers")),
          &method,
          object(payload.get("query")),
        )
      } else {
        webhook(payload, Map::new(), default_method, Map::new())
      }
    }
    "trigger_schedule" => {
      let scheduled = payload
        .get("scheduled_time")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now);
      schedule(scheduled, now)
    }
    "trigger_event" => {
      let name = payload
        .get("event_name")
        .or_else(|| config.get("event_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
      let data = payload.get("event_data").cloned().unwrap_or(payload);
      event(&name, data, now)
    }
    "conversation_start" => {
      let mut state = object(Some(&payload));
      let id = payload
        .get("conversation_id")
        .and_then(Value::as_str)
        .map(str::to_string);
      state.extend(conversation(id));
      state
    }
    _ => match payload {
      Value::Object(map) => map,
      Value::Null => Map::new(),
      other => {
        let mut state = Map::new();
        state.insert("payload".to_string(), other);
        state
      }
    },
  }
}
