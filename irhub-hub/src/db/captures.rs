//! Debug capture log table. Grounded on
//! `original_source/backend/database/schemas/captures.py`.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use irhub_core::error::DomainError;

use super::{db_err, Catalog};

#[derive(Clone, Debug, Serialize)]
pub struct Capture {
  pub id: i64,
  pub button_id: i64,
  pub mode: String,
  pub take_index: i64,
  pub raw_text: String,
  pub created_at: DateTime<Utc>,
}

impl Catalog {
  pub fn create_capture(&self, button_id: i64, mode: &str, take_index: i64, raw_text: &str) -> Result<Capture, DomainError> {
    let mode = mode.trim().to_ascii_lowercase();
    if mode != "press" && mode != "hold" {
      return Err(DomainError::validation("mode must be 'press' or 'hold'"));
    }
    if take_index < 0 {
      return Err(DomainError::validation("take_index must be >= 0"));
    }
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    conn
      .execute(
        "INSERT INTO captures(button_id, mode, take_index, raw_text, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
        params![button_id, mode, take_index, raw_text, now],
      )
      .map_err(db_err)?;
    let id = conn.last_insert_rowid();
    Ok(Capture { id, button_id, mode, take_index, raw_text: raw_text.to_owned(), created_at: DateTime::from_timestamp(now as i64, 0).unwrap_or_else(Utc::now) })
  }

  pub fn clear_captures(&self) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn.execute("DELETE FROM captures", []).map_err(db_err)?;
    Ok(())
  }
}
