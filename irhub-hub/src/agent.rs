//! Agent abstraction (C7): a uniform interface the learning service,
//! sender service, and HTTP status handlers call through, regardless of
//! whether the concrete agent is co-located with the hub or reachable
//! only over MQTT.
//!
//! Grounded on `original_source/backend/agents/local_agent.py` and
//! `mqtt_agent.py`, which both expose the same five operations
//! (`send`, `learn_start`, `learn_stop`, `learn_capture`, `get_status`)
//! over two different transports. Per the "Protocol capability surface"
//! redesign flag in spec.md §9, this is expressed as a trait object
//! (`Arc<dyn Agent>`) rather than a class hierarchy.

pub mod local;
pub mod mqtt;

use async_trait::async_trait;
use irhub_core::error::DomainError;
use irhub_core::protocol::AgentStatus;

/// One physical or logical IR endpoint: the local engine, or a remote
/// agent process reachable over MQTT.
#[async_trait]
pub trait Agent: Send + Sync {
  fn agent_id(&self) -> &str;

  /// `"local"` or `"mqtt"`, matching the `transport` column/property.
  fn transport(&self) -> &'static str;

  /// Transmits `frames` in order (first is the initial/press frame,
  /// remaining copies are repeats for a hold). `hold_ms` is `None` for a
  /// press send; remote agents use it to size the command RPC timeout
  /// (spec.md §4.7: `max(12s, hold_ms/1000 + 5s)`). Returns the underlying
  /// engine's captured `(stdout, stderr)`.
  async fn send(
    &self,
    frames: &[Vec<i64>],
    gap_us: Option<i64>,
    carrier_hz: Option<u32>,
    duty_cycle: Option<u8>,
    hold_ms: Option<u32>,
  ) -> Result<(String, String), DomainError>;

  async fn learn_start(&self) -> Result<(), DomainError>;

  async fn learn_stop(&self) -> Result<(), DomainError>;

  /// Captures exactly one normalized pulse train, waiting up to
  /// `timeout_ms`. Returns the pulses plus `tail_gap_us` (the magnitude of
  /// the trailing space before normalization, when present), used by hold
  /// capture's gap estimation.
  async fn learn_capture(&self, timeout_ms: u64, wideband: bool) -> Result<(Vec<i64>, Option<i64>), DomainError>;

  async fn get_status(&self) -> Result<AgentStatus, DomainError>;
}
