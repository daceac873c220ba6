//! Log reporter (C11, agent side).
//!
//! Grounded on
//! `original_source/backend/connections/agent_log_reporter.py`: every
//! event is always logged locally, then dispatched over MQTT only if its
//! level meets the current minimum dispatch level, which toggles between
//! `info` and `debug` as the C10 debug flag flips. The sanitization and
//! truncation rules themselves already live in `irhub_core::log` so both
//! this reporter and the hub's fan-out (`irhub-hub/src/logs.rs`) share one
//! implementation.

use std::sync::Arc;

use rumqttc::{AsyncClient, QoS};
use serde_json::Map;
use tracing::{debug, error as trace_error, info, warn};

use irhub_core::log::{should_dispatch, LogEvent, LogLevel};

use crate::runtime_state::RuntimeStatePublisher;

pub struct LogReporter {
  client: AsyncClient,
  state: Arc<RuntimeStatePublisher>,
  agent_id: String,
}

impl LogReporter {
  pub fn new(client: AsyncClient, state: Arc<RuntimeStatePublisher>, agent_id: impl Into<String>) -> Arc<Self> {
    Arc::new(Self { client, state, agent_id: agent_id.into() })
  }

  fn min_level(&self) -> LogLevel {
    if self.state.debug_enabled().unwrap_or(false) {
      LogLevel::Debug
    } else {
      LogLevel::Info
    }
  }

  pub async fn emit(&self, level: LogLevel, category: &str, message: &str, request_id: Option<&str>, error_code: Option<&str>, meta: Map<String, serde_json::Value>) {
    let event = LogEvent::new(level, category, message, request_id, error_code, meta);
    self.log_locally(&event);
    if !should_dispatch(event.level, self.min_level()) {
      return;
    }
    let Ok(body) = serde_json::to_vec(&event) else { return };
    let topic = format!("ir/agents/{}/logs", self.agent_id);
    if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, false, body).await {
      warn!(error = %e, "failed to publish log event");
    }
  }

  fn log_locally(&self, event: &LogEvent) {
    match event.level {
      LogLevel::Debug => debug!(category = %event.category, request_id = ?event.request_id, "{}", event.message),
      LogLevel::Info => info!(category = %event.category, request_id = ?event.request_id, "{}", event.message),
      LogLevel::Warn => warn!(category = %event.category, request_id = ?event.request_id, error_code = ?event.error_code, "{}", event.message),
      LogLevel::Error => trace_error!(category = %event.category, request_id = ?event.request_id, error_code = ?event.error_code, "{}", event.message),
    }
  }

  pub async fn debug(&self, category: &str, message: &str, meta: Map<String, serde_json::Value>) {
    self.emit(LogLevel::Debug, category, message, None, None, meta).await;
  }

  pub async fn info(&self, category: &str, message: &str, request_id: Option<&str>, meta: Map<String, serde_json::Value>) {
    self.emit(LogLevel::Info, category, message, request_id, None, meta).await;
  }

  pub async fn warn(&self, category: &str, message: &str, request_id: Option<&str>, error_code: Option<&str>, meta: Map<String, serde_json::Value>) {
    self.emit(LogLevel::Warn, category, message, request_id, error_code, meta).await;
  }

  pub async fn error(&self, category: &str, message: &str, request_id: Option<&str>, error_code: Option<&str>, meta: Map<String, serde_json::Value>) {
    self.emit(LogLevel::Error, category, message, request_id, error_code, meta).await;
  }
}
