//! Status broadcaster (C15): pushes a full status snapshot (agents +
//! pairing window) to every connected status WebSocket whenever either
//! changes.
//!
//! Grounded on `original_source/backend/electronics/status_communication.py`.
//! The manual `Set[WebSocket]` plus `asyncio.run_coroutine_threadsafe`
//! scheduling becomes a `tokio::sync::broadcast` channel, same rationale
//! as [`crate::logs::LogHub`].

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::agents::AgentRecord;
use crate::pairing::PairingStatus;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
  pub agents: Vec<AgentRecord>,
  pub pairing: PairingStatus,
}

pub struct StatusBroadcaster {
  sender: broadcast::Sender<StatusSnapshot>,
}

impl Default for StatusBroadcaster {
  fn default() -> Self {
    let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
    Self { sender }
  }
}

impl StatusBroadcaster {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
    self.sender.subscribe()
  }

  /// No-op if there are no current subscribers, matching the original's
  /// early return when `_connections` is empty.
  pub fn broadcast(&self, snapshot: StatusSnapshot) {
    let _ = self.sender.send(snapshot);
  }
}
