//! Button signals table. Grounded on
//! `original_source/backend/database/schemas/signals.py`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use irhub_core::error::DomainError;

use super::{db_err, Catalog};

#[derive(Clone, Debug, Serialize)]
pub struct ButtonSignals {
  pub button_id: i64,
  pub encoding: String,
  pub press_initial: String,
  /// Never populated by the learning service; see SPEC_FULL.md §D.
  pub press_repeat: Option<String>,
  pub hold_initial: Option<String>,
  pub hold_repeat: Option<String>,
  pub hold_gap_us: Option<i64>,
  pub sample_count_press: i64,
  pub sample_count_hold: i64,
  pub quality_score_press: Option<f64>,
  pub quality_score_hold: Option<f64>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

fn unix_to_datetime(seconds: f64) -> DateTime<Utc> {
  DateTime::from_timestamp(seconds as i64, 0).unwrap_or_else(Utc::now)
}

fn row_to_signals(row: &rusqlite::Row) -> rusqlite::Result<ButtonSignals> {
  Ok(ButtonSignals {
    button_id: row.get("button_id")?,
    encoding: row.get("encoding")?,
    press_initial: row.get("press_initial")?,
    press_repeat: row.get("press_repeat")?,
    hold_initial: row.get("hold_initial")?,
    hold_repeat: row.get("hold_repeat")?,
    hold_gap_us: row.get("hold_gap_us")?,
    sample_count_press: row.get("sample_count_press")?,
    sample_count_hold: row.get("sample_count_hold")?,
    quality_score_press: row.get("quality_score_press")?,
    quality_score_hold: row.get("quality_score_hold")?,
    created_at: unix_to_datetime(row.get("created_at")?),
    updated_at: unix_to_datetime(row.get("updated_at")?),
  })
}

impl Catalog {
  pub fn get_signals(&self, button_id: i64) -> Result<Option<ButtonSignals>, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn.query_row("SELECT * FROM button_signals WHERE button_id = ?1", params![button_id], row_to_signals).optional().map_err(db_err)
  }

  pub fn upsert_press(
    &self,
    button_id: i64,
    press_initial: &str,
    press_repeat: Option<&str>,
    sample_count_press: i64,
    quality_score_press: Option<f64>,
    encoding: &str,
  ) -> Result<ButtonSignals, DomainError> {
    let press_initial = press_initial.trim();
    if press_initial.is_empty() {
      return Err(DomainError::validation("press_initial must not be empty"));
    }
    if sample_count_press <= 0 {
      return Err(DomainError::validation("sample_count_press must be > 0"));
    }

    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    let existing: Option<i64> = conn.query_row("SELECT button_id FROM button_signals WHERE button_id = ?1", params![button_id], |r| r.get(0)).optional().map_err(db_err)?;

    if existing.is_some() {
      conn
        .execute(
          "UPDATE button_signals SET encoding = ?1, press_initial = ?2, press_repeat = ?3, sample_count_press = ?4, quality_score_press = ?5, updated_at = ?6 WHERE button_id = ?7",
          params![encoding, press_initial, press_repeat, sample_count_press, quality_score_press, now, button_id],
        )
        .map_err(db_err)?;
    } else {
      conn
        .execute(
          "INSERT INTO button_signals(
             button_id, encoding, press_initial, press_repeat,
             hold_initial, hold_repeat, hold_gap_us,
             sample_count_press, sample_count_hold,
             quality_score_press, quality_score_hold,
             created_at, updated_at
           ) VALUES(?1, ?2, ?3, ?4, NULL, NULL, NULL, ?5, 0, ?6, NULL, ?7, ?7)",
          params![button_id, encoding, press_initial, press_repeat, sample_count_press, quality_score_press, now],
        )
        .map_err(db_err)?;
    }

    conn.query_row("SELECT * FROM button_signals WHERE button_id = ?1", params![button_id], row_to_signals).map_err(db_err)
  }

  pub fn update_hold(
    &self,
    button_id: i64,
    hold_initial: &str,
    hold_repeat: Option<&str>,
    hold_gap_us: Option<i64>,
    sample_count_hold: i64,
    quality_score_hold: Option<f64>,
  ) -> Result<ButtonSignals, DomainError> {
    let hold_initial = hold_initial.trim();
    if hold_initial.is_empty() {
      return Err(DomainError::validation("hold_initial must not be empty"));
    }
    if sample_count_hold <= 0 {
      return Err(DomainError::validation("sample_count_hold must be > 0"));
    }

    let conn = self.conn.lock().expect("catalog connection poisoned");
    let existing: Option<i64> = conn.query_row("SELECT button_id FROM button_signals WHERE button_id = ?1", params![button_id], |r| r.get(0)).optional().map_err(db_err)?;
    if existing.is_none() {
      return Err(DomainError::conflict("press_required", "press signal must be captured before hold"));
    }

    let now = Utc::now().timestamp() as f64;
    conn
      .execute(
        "UPDATE button_signals SET hold_initial = ?1, hold_repeat = ?2, hold_gap_us = ?3, sample_count_hold = ?4, quality_score_hold = ?5, updated_at = ?6 WHERE button_id = ?7",
        params![hold_initial, hold_repeat, hold_gap_us, sample_count_hold, quality_score_hold, now, button_id],
      )
      .map_err(db_err)?;

    conn.query_row("SELECT * FROM button_signals WHERE button_id = ?1", params![button_id], row_to_signals).map_err(db_err)
  }
}
