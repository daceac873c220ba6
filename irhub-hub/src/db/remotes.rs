//! Remotes table. Grounded on
//! `original_source/backend/database/schemas/remotes.py`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use irhub_core::error::DomainError;

use super::{db_err, Catalog};

#[derive(Clone, Debug, Serialize)]
pub struct Remote {
  pub id: i64,
  pub name: String,
  pub icon: Option<String>,
  pub carrier_hz: Option<i64>,
  pub duty_cycle: Option<i64>,
  pub assigned_agent_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

fn row_to_remote(row: &rusqlite::Row) -> rusqlite::Result<Remote> {
  Ok(Remote {
    id: row.get("id")?,
    name: row.get("name")?,
    icon: row.get("icon")?,
    carrier_hz: row.get("carrier_hz")?,
    duty_cycle: row.get("duty_cycle")?,
    assigned_agent_id: row.get("assigned_agent_id")?,
    created_at: unix_to_datetime(row.get("created_at")?),
    updated_at: unix_to_datetime(row.get("updated_at")?),
  })
}

fn unix_to_datetime(seconds: f64) -> DateTime<Utc> {
  DateTime::from_timestamp(seconds as i64, 0).unwrap_or_else(Utc::now)
}

impl Catalog {
  pub fn create_remote(&self, name: &str, icon: Option<&str>, carrier_hz: Option<i64>, duty_cycle: Option<i64>) -> Result<Remote, DomainError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(DomainError::validation("remote name must not be empty"));
    }
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    conn
      .execute(
        "INSERT OR IGNORE INTO remotes(name, icon, carrier_hz, duty_cycle, created_at, updated_at) VALUES(?1, ?2, ?3, ?4, ?5, ?5)",
        params![name, icon, carrier_hz, duty_cycle, now],
      )
      .map_err(db_err)?;
    conn
      .query_row("SELECT * FROM remotes WHERE name = ?1", params![name], row_to_remote)
      .map_err(db_err)
  }

  pub fn update_remote(&self, remote_id: i64, name: &str, icon: Option<&str>, carrier_hz: Option<i64>, duty_cycle: Option<i64>) -> Result<Remote, DomainError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(DomainError::validation("remote name must not be empty"));
    }
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    let updated = conn
      .execute(
        "UPDATE remotes SET name = ?1, icon = ?2, carrier_hz = ?3, duty_cycle = ?4, updated_at = ?5 WHERE id = ?6",
        params![name, icon, carrier_hz, duty_cycle, now, remote_id],
      )
      .map_err(db_err)?;
    if updated == 0 {
      return Err(DomainError::not_found("unknown remote_id"));
    }
    conn.query_row("SELECT * FROM remotes WHERE id = ?1", params![remote_id], row_to_remote).map_err(db_err)
  }

  pub fn delete_remote(&self, remote_id: i64) -> Result<Remote, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let remote = conn
      .query_row("SELECT * FROM remotes WHERE id = ?1", params![remote_id], row_to_remote)
      .optional()
      .map_err(db_err)?
      .ok_or_else(|| DomainError::not_found("unknown remote_id"))?;
    conn.execute("DELETE FROM remotes WHERE id = ?1", params![remote_id]).map_err(db_err)?;
    Ok(remote)
  }

  pub fn get_remote(&self, remote_id: i64) -> Result<Remote, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn
      .query_row("SELECT * FROM remotes WHERE id = ?1", params![remote_id], row_to_remote)
      .optional()
      .map_err(db_err)?
      .ok_or_else(|| DomainError::not_found("unknown remote_id"))
  }

  pub fn list_remotes(&self) -> Result<Vec<Remote>, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let mut stmt = conn.prepare("SELECT * FROM remotes ORDER BY name").map_err(db_err)?;
    let rows = stmt.query_map([], row_to_remote).map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
  }

  pub fn clear_buttons(&self, remote_id: i64) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let exists: Option<i64> = conn.query_row("SELECT id FROM remotes WHERE id = ?1", params![remote_id], |r| r.get(0)).optional().map_err(db_err)?;
    if exists.is_none() {
      return Err(DomainError::not_found("unknown remote_id"));
    }
    conn.execute("DELETE FROM buttons WHERE remote_id = ?1", params![remote_id]).map_err(db_err)?;
    Ok(())
  }

  /// Sets (or clears, with `None`) which agent a remote is pinned to.
  pub fn set_assigned_agent(&self, remote_id: i64, agent_id: Option<&str>) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    let updated = conn
      .execute("UPDATE remotes SET assigned_agent_id = ?1, updated_at = ?2 WHERE id = ?3", params![agent_id, now, remote_id])
      .map_err(db_err)?;
    if updated == 0 {
      return Err(DomainError::not_found("unknown remote_id"));
    }
    Ok(())
  }

  /// Clears `assigned_agent_id` on every remote pinned to `agent_id`,
  /// returning how many rows were affected (used by the unpair flow, per
  /// SPEC_FULL.md §C.4).
  pub fn unassign_agent_from_remotes(&self, agent_id: &str) -> Result<usize, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    let updated = conn
      .execute(
        "UPDATE remotes SET assigned_agent_id = NULL, updated_at = ?1 WHERE assigned_agent_id = ?2",
        params![now, agent_id],
      )
      .map_err(db_err)?;
    Ok(updated)
  }
}
