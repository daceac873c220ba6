//! Agent-local persisted state: the agent's own identity plus the pairing
//! binding and debug flag carried on the wire by C10.
//!
//! Grounded on three original_source files folded into one table, per
//! SPEC_FULL.md §C.3/§C.5's supplement note: `agents/agent_id_store.py`
//! (file-based UUID persistence), `connections/pairing_manager_agent.py`'s
//! use of a `Settings` key/value store for the binding fields, and
//! `connections/agent_runtime_state_store.py`'s `{pairing_hub_id, debug}`
//! pair. A single-row SQLite table is simpler than three separate stores
//! and gives the same durability guarantee `irhub-hub`'s own `Catalog`
//! relies on (see `irhub-hub/src/db.rs`), at the one-row scale an agent
//! actually needs.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

use irhub_core::error::DomainError;
use irhub_core::protocol::RuntimeState;

/// The pairing-related fields persisted locally (SPEC_FULL.md §C.3):
/// everything the wire's `RuntimeState` carries plus the bookkeeping the
/// original kept to answer a local "pairing status" query and reject
/// duplicate accepts.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BindingData {
  pub pairing_hub_id: String,
  pub pairing_hub_topic: String,
  pub pairing_hub_name: String,
  pub pairing_session_id: String,
  pub pairing_nonce: String,
  pub pairing_accepted_at: String,
  pub debug: bool,
}

pub struct AgentStateStore {
  conn: Mutex<Connection>,
}

impl AgentStateStore {
  pub fn open(db_path: &str) -> Result<Self, DomainError> {
    let conn = Connection::open(db_path).map_err(db_err)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;").map_err(db_err)?;
    let store = Self { conn: Mutex::new(conn) };
    store.init_schema()?;
    Ok(store)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, DomainError> {
    let conn = Connection::open_in_memory().map_err(db_err)?;
    let store = Self { conn: Mutex::new(conn) };
    store.init_schema()?;
    Ok(store)
  }

  fn init_schema(&self) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("agent state connection poisoned");
    conn
      .execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agent_state (
          id INTEGER PRIMARY KEY CHECK (id = 1),
          agent_id TEXT NOT NULL,
          pairing_hub_id TEXT NOT NULL DEFAULT '',
          pairing_hub_topic TEXT NOT NULL DEFAULT '',
          pairing_hub_name TEXT NOT NULL DEFAULT '',
          pairing_session_id TEXT NOT NULL DEFAULT '',
          pairing_nonce TEXT NOT NULL DEFAULT '',
          pairing_accepted_at TEXT NOT NULL DEFAULT '',
          debug INTEGER NOT NULL DEFAULT 0
        );
        "#,
      )
      .map_err(db_err)?;
    Ok(())
  }

  /// Returns the persisted `agent_id`, generating and persisting a fresh
  /// v4 UUID the first time this store is opened. Replaces
  /// `agent_id_store.get_or_create_agent_id`'s flat file with the same
  /// single-row table everything else here lives in.
  pub fn get_or_create_agent_id(&self) -> Result<String, DomainError> {
    let conn = self.conn.lock().expect("agent state connection poisoned");
    let existing: Option<String> = conn.query_row("SELECT agent_id FROM agent_state WHERE id = 1", [], |r| r.get(0)).optional().map_err(db_err)?;
    if let Some(agent_id) = existing.filter(|s| !s.trim().is_empty()) {
      return Ok(agent_id);
    }
    let agent_id = Uuid::new_v4().to_string();
    conn
      .execute("INSERT INTO agent_state(id, agent_id) VALUES (1, ?1) ON CONFLICT(id) DO UPDATE SET agent_id = excluded.agent_id", params![agent_id])
      .map_err(db_err)?;
    Ok(agent_id)
  }

  pub fn is_bound(&self) -> Result<bool, DomainError> {
    Ok(!self.binding_data()?.pairing_hub_id.trim().is_empty())
  }

  pub fn binding_data(&self) -> Result<BindingData, DomainError> {
    let conn = self.conn.lock().expect("agent state connection poisoned");
    conn
      .query_row(
        "SELECT pairing_hub_id, pairing_hub_topic, pairing_hub_name, pairing_session_id, pairing_nonce, pairing_accepted_at, debug
         FROM agent_state WHERE id = 1",
        [],
        |r| {
          Ok(BindingData {
            pairing_hub_id: r.get(0)?,
            pairing_hub_topic: r.get(1)?,
            pairing_hub_name: r.get(2)?,
            pairing_session_id: r.get(3)?,
            pairing_nonce: r.get(4)?,
            pairing_accepted_at: r.get(5)?,
            debug: r.get(6)?,
          })
        },
      )
      .optional()
      .map_err(db_err)
      .map(|row| row.unwrap_or_default())
  }

  pub fn debug_enabled(&self) -> Result<bool, DomainError> {
    Ok(self.binding_data()?.debug)
  }

  /// Builds the `{pairing_hub_id, debug}` snapshot carried on the wire
  /// (§4.10/§6), dropping the agent-local-only bookkeeping fields.
  pub fn runtime_state(&self) -> Result<RuntimeState, DomainError> {
    let binding = self.binding_data()?;
    let pairing_hub_id = (!binding.pairing_hub_id.trim().is_empty()).then_some(binding.pairing_hub_id);
    Ok(RuntimeState { pairing_hub_id, debug: binding.debug })
  }

  #[allow(clippy::too_many_arguments)]
  pub fn set_binding(&self, hub_id: &str, hub_topic: &str, hub_name: &str, session_id: &str, nonce: &str, accepted_at: &str) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("agent state connection poisoned");
    conn
      .execute(
        "INSERT INTO agent_state(id, agent_id, pairing_hub_id, pairing_hub_topic, pairing_hub_name, pairing_session_id, pairing_nonce, pairing_accepted_at)
         VALUES (1, '', ?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           pairing_hub_id = excluded.pairing_hub_id,
           pairing_hub_topic = excluded.pairing_hub_topic,
           pairing_hub_name = excluded.pairing_hub_name,
           pairing_session_id = excluded.pairing_session_id,
           pairing_nonce = excluded.pairing_nonce,
           pairing_accepted_at = excluded.pairing_accepted_at",
        params![hub_id, hub_topic, hub_name, session_id, nonce, accepted_at],
      )
      .map_err(db_err)?;
    Ok(())
  }

  pub fn clear_binding(&self) -> Result<(), DomainError> {
    self.set_binding("", "", "", "", "", "")
  }

  pub fn set_debug(&self, enabled: bool) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("agent state connection poisoned");
    conn
      .execute(
        "INSERT INTO agent_state(id, agent_id, debug) VALUES (1, '', ?1)
         ON CONFLICT(id) DO UPDATE SET debug = excluded.debug",
        params![enabled],
      )
      .map_err(db_err)?;
    Ok(())
  }
}

fn db_err(err: rusqlite::Error) -> DomainError {
  DomainError::new(irhub_core::error::ErrorKind::Internal, "db_error", err.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn persists_agent_id_across_calls() {
    let store = AgentStateStore::open_in_memory().unwrap();
    let first = store.get_or_create_agent_id().unwrap();
    let second = store.get_or_create_agent_id().unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn binding_round_trips() {
    let store = AgentStateStore::open_in_memory().unwrap();
    assert!(!store.is_bound().unwrap());
    store.set_binding("hub-1", "ir/hubs/hub-1", "Living Room Hub", "sess-1", "nonce-1", "2026-01-01T00:00:00Z").unwrap();
    assert!(store.is_bound().unwrap());
    let binding = store.binding_data().unwrap();
    assert_eq!(binding.pairing_hub_id, "hub-1");
    assert_eq!(binding.pairing_session_id, "sess-1");

    store.clear_binding().unwrap();
    assert!(!store.is_bound().unwrap());
  }

  #[test]
  fn debug_flag_round_trips_independently_of_binding() {
    let store = AgentStateStore::open_in_memory().unwrap();
    store.set_debug(true).unwrap();
    store.set_binding("hub-1", "", "", "", "", "").unwrap();
    assert!(store.debug_enabled().unwrap());
  }

  #[test]
  fn runtime_state_omits_empty_hub_id() {
    let store = AgentStateStore::open_in_memory().unwrap();
    let state = store.runtime_state().unwrap();
    assert_eq!(state.pairing_hub_id, None);
    assert!(!state.debug);
  }
}
