//! Agents table. Grounded on
//! `original_source/backend/database/schemas/agents.py`, extended with the
//! `pending`/`pairing_session_id` columns spec.md's pairing invariants
//! require (see SPEC_FULL.md note on the schema discrepancy between
//! `agents.py` and `pairing_manager_hub.py`'s actual usage).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use irhub_core::error::DomainError;

use super::{db_err, Catalog};

#[derive(Clone, Debug, Serialize)]
pub struct AgentRecord {
  pub agent_id: String,
  pub name: Option<String>,
  pub transport: String,
  pub status: String,
  pub can_send: bool,
  pub can_learn: bool,
  pub pending: bool,
  pub pairing_session_id: Option<String>,
  pub sw_version: Option<String>,
  pub agent_topic: Option<String>,
  pub configuration_url: Option<String>,
  pub icon: Option<String>,
  pub last_seen: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

fn unix_to_datetime(seconds: f64) -> DateTime<Utc> {
  DateTime::from_timestamp(seconds as i64, 0).unwrap_or_else(Utc::now)
}

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<AgentRecord> {
  Ok(AgentRecord {
    agent_id: row.get("agent_id")?,
    name: row.get("name")?,
    transport: row.get("transport")?,
    status: row.get("status")?,
    can_send: row.get::<_, i64>("can_send")? != 0,
    can_learn: row.get::<_, i64>("can_learn")? != 0,
    pending: row.get::<_, i64>("pending")? != 0,
    pairing_session_id: row.get("pairing_session_id")?,
    sw_version: row.get("sw_version")?,
    agent_topic: row.get("agent_topic")?,
    configuration_url: row.get("configuration_url")?,
    icon: row.get("icon")?,
    last_seen: row.get::<_, Option<f64>>("last_seen")?.map(unix_to_datetime),
    created_at: unix_to_datetime(row.get("created_at")?),
    updated_at: unix_to_datetime(row.get("updated_at")?),
  })
}

#[allow(clippy::too_many_arguments)]
impl Catalog {
  pub fn upsert_agent(
    &self,
    agent_id: &str,
    name: Option<&str>,
    transport: &str,
    status: &str,
    can_send: bool,
    can_learn: bool,
    sw_version: Option<&str>,
    agent_topic: Option<&str>,
    configuration_url: Option<&str>,
    icon: Option<&str>,
    last_seen: Option<f64>,
  ) -> Result<AgentRecord, DomainError> {
    let agent_id = agent_id.trim();
    if agent_id.is_empty() {
      return Err(DomainError::validation("agent_id must not be empty"));
    }
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    conn
      .execute(
        "INSERT INTO agents(
           agent_id, name, transport, status, can_send, can_learn,
           pending, pairing_session_id, sw_version, agent_topic, configuration_url, icon,
           last_seen, created_at, updated_at
         ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
         ON CONFLICT(agent_id) DO UPDATE SET
           name = excluded.name,
           transport = excluded.transport,
           status = excluded.status,
           can_send = excluded.can_send,
           can_learn = excluded.can_learn,
           sw_version = excluded.sw_version,
           agent_topic = excluded.agent_topic,
           configuration_url = COALESCE(excluded.configuration_url, agents.configuration_url),
           icon = COALESCE(excluded.icon, agents.icon),
           last_seen = excluded.last_seen,
           updated_at = excluded.updated_at",
        params![agent_id, name, transport, status, can_send as i64, can_learn as i64, sw_version, agent_topic, configuration_url, icon, last_seen, now],
      )
      .map_err(db_err)?;
    conn.query_row("SELECT * FROM agents WHERE agent_id = ?1", params![agent_id], row_to_agent).map_err(db_err)
  }

  pub fn update_agent_name_url(&self, agent_id: &str, name: Option<&str>, configuration_url: Option<&str>) -> Result<AgentRecord, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let existing = conn.query_row("SELECT * FROM agents WHERE agent_id = ?1", params![agent_id], row_to_agent).optional().map_err(db_err)?
      .ok_or_else(|| DomainError::not_found("unknown agent_id"))?;
    let next_name = name.unwrap_or(existing.name.as_deref().unwrap_or_default());
    let next_url = configuration_url.or(existing.configuration_url.as_deref());
    let now = Utc::now().timestamp() as f64;
    conn
      .execute("UPDATE agents SET name = ?1, configuration_url = ?2, updated_at = ?3 WHERE agent_id = ?4", params![next_name, next_url, now, agent_id])
      .map_err(db_err)?;
    conn.query_row("SELECT * FROM agents WHERE agent_id = ?1", params![agent_id], row_to_agent).map_err(db_err)
  }

  pub fn set_agent_status(&self, agent_id: &str, status: &str, last_seen: Option<f64>) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    conn.execute("UPDATE agents SET status = ?1, last_seen = ?2, updated_at = ?3 WHERE agent_id = ?4", params![status, last_seen, now, agent_id]).map_err(db_err)?;
    Ok(())
  }

  pub fn touch_agent_last_seen(&self, agent_id: &str, last_seen: f64) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    conn.execute("UPDATE agents SET last_seen = ?1, updated_at = ?2 WHERE agent_id = ?3", params![last_seen, now, agent_id]).map_err(db_err)?;
    Ok(())
  }

  pub fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn.query_row("SELECT * FROM agents WHERE agent_id = ?1", params![agent_id], row_to_agent).optional().map_err(db_err)
  }

  pub fn list_agents(&self) -> Result<Vec<AgentRecord>, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let mut stmt = conn.prepare("SELECT * FROM agents ORDER BY name, agent_id").map_err(db_err)?;
    let rows = stmt.query_map([], row_to_agent).map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
  }

  /// Marks an agent pending pairing acceptance under `session_id`, or
  /// clears pending state when `session_id` is `None`.
  pub fn set_pending_state(&self, agent_id: &str, pending: bool, session_id: Option<&str>) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    conn
      .execute(
        "UPDATE agents SET pending = ?1, pairing_session_id = ?2, updated_at = ?3 WHERE agent_id = ?4",
        params![pending as i64, session_id, now, agent_id],
      )
      .map_err(db_err)?;
    Ok(())
  }

  pub fn delete_agent(&self, agent_id: &str) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn.execute("DELETE FROM agents WHERE agent_id = ?1", params![agent_id]).map_err(db_err)?;
    Ok(())
  }

  /// Deletes agents still pending pairing acceptance. With `session_id`,
  /// only deletes those pending under that session; `None` sweeps all
  /// pending agents, matching `PairingManagerHub.start()`/`open_pairing()`
  /// clearing stale offers from a previous window.
  pub fn delete_pending_agents(&self, session_id: Option<&str>) -> Result<usize, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let deleted = match session_id {
      Some(session_id) => conn.execute("DELETE FROM agents WHERE pending = 1 AND pairing_session_id = ?1", params![session_id]).map_err(db_err)?,
      None => conn.execute("DELETE FROM agents WHERE pending = 1", []).map_err(db_err)?,
    };
    Ok(deleted)
  }
}
