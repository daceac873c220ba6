//! Buttons table. Grounded on
//! `original_source/app/database/schemas/buttons.py`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use irhub_core::error::DomainError;

use super::{db_err, Catalog};

#[derive(Clone, Debug, Serialize)]
pub struct Button {
  pub id: i64,
  pub remote_id: i64,
  pub name: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ButtonListEntry {
  #[serde(flatten)]
  pub button: Button,
  pub has_press: bool,
  pub has_hold: bool,
}

fn unix_to_datetime(seconds: f64) -> DateTime<Utc> {
  DateTime::from_timestamp(seconds as i64, 0).unwrap_or_else(Utc::now)
}

fn row_to_button(row: &rusqlite::Row) -> rusqlite::Result<Button> {
  Ok(Button {
    id: row.get("id")?,
    remote_id: row.get("remote_id")?,
    name: row.get("name")?,
    created_at: unix_to_datetime(row.get("created_at")?),
    updated_at: unix_to_datetime(row.get("updated_at")?),
  })
}

impl Catalog {
  pub fn create_button(&self, remote_id: i64, name: &str) -> Result<Button, DomainError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(DomainError::validation("button name must not be empty"));
    }
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let remote_exists: Option<i64> = conn.query_row("SELECT id FROM remotes WHERE id = ?1", params![remote_id], |r| r.get(0)).optional().map_err(db_err)?;
    if remote_exists.is_none() {
      return Err(DomainError::not_found("unknown remote_id"));
    }
    let now = Utc::now().timestamp() as f64;
    conn
      .execute(
        "INSERT OR IGNORE INTO buttons(remote_id, name, created_at, updated_at) VALUES(?1, ?2, ?3, ?3)",
        params![remote_id, name, now],
      )
      .map_err(db_err)?;
    conn
      .query_row("SELECT * FROM buttons WHERE remote_id = ?1 AND name = ?2", params![remote_id, name], row_to_button)
      .map_err(db_err)
  }

  pub fn get_button(&self, button_id: i64) -> Result<Button, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn
      .query_row("SELECT * FROM buttons WHERE id = ?1", params![button_id], row_to_button)
      .optional()
      .map_err(db_err)?
      .ok_or_else(|| DomainError::not_found("unknown button_id"))
  }

  pub fn get_button_by_name(&self, remote_id: i64, name: &str) -> Result<Option<Button>, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn
      .query_row("SELECT * FROM buttons WHERE remote_id = ?1 AND name = ?2", params![remote_id, name.trim()], row_to_button)
      .optional()
      .map_err(db_err)
  }

  pub fn list_buttons(&self, remote_id: i64) -> Result<Vec<ButtonListEntry>, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let mut stmt = conn
      .prepare(
        "SELECT b.id, b.remote_id, b.name, b.created_at, b.updated_at,
                CASE WHEN s.button_id IS NULL THEN 0 ELSE 1 END AS has_press,
                CASE WHEN s.hold_initial IS NULL OR s.hold_initial = '' THEN 0 ELSE 1 END AS has_hold
         FROM buttons b
         LEFT JOIN button_signals s ON s.button_id = b.id
         WHERE b.remote_id = ?1
         ORDER BY b.name",
      )
      .map_err(db_err)?;
    let rows = stmt
      .query_map(params![remote_id], |row| {
        Ok(ButtonListEntry {
          button: row_to_button(row)?,
          has_press: row.get::<_, i64>("has_press")? != 0,
          has_hold: row.get::<_, i64>("has_hold")? != 0,
        })
      })
      .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
  }

  pub fn rename_button(&self, button_id: i64, name: &str) -> Result<Button, DomainError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(DomainError::validation("button name must not be empty"));
    }
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    let updated = conn.execute("UPDATE buttons SET name = ?1, updated_at = ?2 WHERE id = ?3", params![name, now, button_id]).map_err(db_err)?;
    if updated == 0 {
      return Err(DomainError::not_found("unknown button_id"));
    }
    conn.query_row("SELECT * FROM buttons WHERE id = ?1", params![button_id], row_to_button).map_err(db_err)
  }

  pub fn delete_button(&self, button_id: i64) -> Result<Button, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let button = conn
      .query_row("SELECT * FROM buttons WHERE id = ?1", params![button_id], row_to_button)
      .optional()
      .map_err(db_err)?
      .ok_or_else(|| DomainError::not_found("unknown button_id"))?;
    conn.execute("DELETE FROM buttons WHERE id = ?1", params![button_id]).map_err(db_err)?;
    Ok(button)
  }
}
