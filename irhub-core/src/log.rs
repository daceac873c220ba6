//! Structured log event model and sanitization.
//!
//! Grounded on `original_source/backend/connections/agent_log_reporter.py`
//! (`_build_event`, `_sanitize_meta`, `_sanitize_meta_value`) for the
//! truncation rules, and on `agent_log_hub.py` (`_normalize_event`,
//! `_sanitize_meta`) for the hub-side re-validation of the same shape on
//! ingest. Both the agent's reporter (C11 agent side) and the hub's log
//! fan-out (C11 hub side) build on this single model so the two can't
//! drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MAX_MESSAGE_LEN: usize = 300;
const MAX_CATEGORY_LEN: usize = 40;
const MAX_ID_LEN: usize = 80;
const MAX_META_DEPTH: usize = 3;
const MAX_META_KEYS: usize = 16;
const MAX_META_LIST_ITEMS: usize = 12;
const MAX_META_STRING_LEN: usize = 240;

/// Severity of a log event, ordered `Debug < Info < Warn < Error`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Debug,
  Info,
  Warn,
  Error,
}

impl LogLevel {
  pub fn order(self) -> u8 {
    match self {
      LogLevel::Debug => 10,
      LogLevel::Info => 20,
      LogLevel::Warn => 30,
      LogLevel::Error => 40,
    }
  }
}

/// A single structured log event, as carried on `ir/agents/{agent}/logs`
/// and streamed over the hub's WebSocket log surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEvent {
  pub timestamp: DateTime<Utc>,
  pub level: LogLevel,
  pub category: String,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_code: Option<String>,
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub meta: Map<String, Value>,
}

impl LogEvent {
  /// Builds a sanitized event, truncating every field to the limits the
  /// original reporter enforces before it ever reaches the wire.
  pub fn new(
    level: LogLevel,
    category: &str,
    message: &str,
    request_id: Option<&str>,
    error_code: Option<&str>,
    meta: Map<String, Value>,
  ) -> Self {
    Self {
      timestamp: Utc::now(),
      level,
      category: truncate_id(category, MAX_CATEGORY_LEN),
      message: truncate(message, MAX_MESSAGE_LEN),
      request_id: request_id.map(|v| truncate_id(v, MAX_ID_LEN)),
      error_code: error_code.map(|v| truncate_id(v, MAX_ID_LEN)),
      meta: sanitize_meta(&meta, 0),
    }
  }
}

fn truncate(value: &str, max_len: usize) -> String {
  if value.chars().count() <= max_len {
    return value.to_owned();
  }
  let prefix: String = value.chars().take(max_len.saturating_sub(3)).collect();
  format!("{}...", prefix)
}

fn truncate_id(value: &str, max_len: usize) -> String {
  truncate(value, max_len)
}

/// Whether `candidate` should be dispatched given `min_level`.
pub fn should_dispatch(candidate: LogLevel, min_level: LogLevel) -> bool {
  candidate.order() >= min_level.order()
}

/// Recursively truncates a meta map to the shape the wire protocol allows:
/// depth capped at 3, at most 16 keys per object, at most 12 items per
/// list, and string values capped at 240 chars.
pub fn sanitize_meta(meta: &Map<String, Value>, depth: usize) -> Map<String, Value> {
  if depth > MAX_META_DEPTH {
    let mut truncated = Map::new();
    truncated.insert("truncated".to_owned(), Value::Bool(true));
    return truncated;
  }
  let mut out = Map::new();
  for (i, (key, value)) in meta.iter().enumerate() {
    if i >= MAX_META_KEYS {
      out.insert("truncated".to_owned(), Value::Bool(true));
      break;
    }
    out.insert(key.clone(), sanitize_meta_value(value, depth));
  }
  out
}

fn sanitize_meta_value(value: &Value, depth: usize) -> Value {
  match value {
    Value::Object(map) => Value::Object(sanitize_meta(map, depth + 1)),
    Value::Array(items) => {
      if depth + 1 > MAX_META_DEPTH {
        return Value::Array(vec![Value::String("truncated".to_owned())]);
      }
      let mut out: Vec<Value> = items
        .iter()
        .take(MAX_META_LIST_ITEMS)
        .map(|item| sanitize_meta_value(item, depth + 1))
        .collect();
      if items.len() > MAX_META_LIST_ITEMS {
        out.push(Value::String("...".to_owned()));
      }
      Value::Array(out)
    }
    Value::String(s) => Value::String(truncate(s, MAX_META_STRING_LEN)),
    other => other.clone(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn truncates_long_message() {
    let long = "x".repeat(500);
    let event = LogEvent::new(LogLevel::Info, "cat", &long, None, None, Map::new());
    assert_eq!(event.message.chars().count(), MAX_MESSAGE_LEN);
    assert!(event.message.ends_with("..."));
  }

  #[test]
  fn caps_meta_depth() {
    let deeply_nested = json!({"a": {"b": {"c": {"d": "too deep"}}}});
    let mut meta = Map::new();
    meta.insert("root".to_owned(), deeply_nested);
    let sanitized = sanitize_meta(&meta, 0);
    let inner = &sanitized["root"]["b"]["c"];
    assert_eq!(inner.get("truncated"), Some(&Value::Bool(true)));
  }

  #[test]
  fn caps_meta_list_items() {
    let items: Vec<Value> = (0..20).map(Value::from).collect();
    let mut meta = Map::new();
    meta.insert("list".to_owned(), Value::Array(items));
    let sanitized = sanitize_meta(&meta, 0);
    let list = sanitized["list"].as_array().unwrap();
    assert_eq!(list.len(), MAX_META_LIST_ITEMS + 1);
    assert_eq!(list.last().unwrap(), &Value::String("...".to_owned()));
  }

  #[test]
  fn dispatch_respects_min_level() {
    assert!(!should_dispatch(LogLevel::Debug, LogLevel::Info));
    assert!(should_dispatch(LogLevel::Warn, LogLevel::Info));
    assert!(should_dispatch(LogLevel::Info, LogLevel::Info));
  }
}
