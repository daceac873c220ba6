//! Catalog store (C5): an embedded SQLite database holding remotes,
//! buttons, signals, captures, agents, and settings.
//!
//! Grounded on `original_source/backend/database/database_base.py`
//! (`PRAGMA journal_mode=WAL`, `PRAGMA foreign_keys=ON`, one connection per
//! process guarded by a lock rather than per-call) and the individual
//! `database/schemas/*.py` files for each table, generalized from Python's
//! `sqlite3` to `rusqlite`. The teacher has no database of its own
//! (`cdp_api` is backed by `InMemoryApiDatabase`); this module plays the
//! role `cdp_api/src/db/inmem.rs` plays for the teacher — the thing behind
//! a `Mutex`, initialized once at startup — generalized to a real
//! on-disk store since spec.md's Catalog component calls for row-level
//! locking and WAL journaling.

pub mod agents;
pub mod buttons;
pub mod captures;
pub mod remotes;
pub mod settings;
pub mod signals;

use std::sync::Mutex;

use rusqlite::Connection;

use irhub_core::error::DomainError;

/// The catalog store. A single connection behind a `Mutex`, matching the
/// teacher's `InMemoryApiDatabase { backing: Arc<Mutex<UnderlyingData>> }`
/// shape: SQLite's own writer serialization makes a single shared
/// connection simpler than a pool here, and WAL mode lets readers proceed
/// concurrently with an in-flight writer at the SQLite layer even though
/// Rust-side access is still funneled through one lock.
pub struct Catalog {
  conn: Mutex<Connection>,
}

impl Catalog {
  pub fn open(db_path: &str) -> Result<Self, DomainError> {
    let conn = Connection::open(db_path).map_err(|e| DomainError::new(irhub_core::error::ErrorKind::Internal, "db_open_failed", e.to_string()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
      .map_err(db_err)?;
    let catalog = Self { conn: Mutex::new(conn) };
    catalog.init_schema()?;
    Ok(catalog)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, DomainError> {
    let conn = Connection::open_in_memory().map_err(db_err)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
    let catalog = Self { conn: Mutex::new(conn) };
    catalog.init_schema()?;
    Ok(catalog)
  }

  fn init_schema(&self) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn
      .execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS remotes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL UNIQUE,
          icon TEXT NULL,
          carrier_hz INTEGER NULL,
          duty_cycle INTEGER NULL,
          assigned_agent_id TEXT NULL REFERENCES agents(agent_id) ON DELETE SET NULL,
          created_at REAL NOT NULL,
          updated_at REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS buttons (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          remote_id INTEGER NOT NULL REFERENCES remotes(id) ON DELETE CASCADE,
          name TEXT NOT NULL,
          created_at REAL NOT NULL,
          updated_at REAL NOT NULL,
          UNIQUE(remote_id, name)
        );
        CREATE INDEX IF NOT EXISTS ix_buttons_remote_id ON buttons(remote_id);

        CREATE TABLE IF NOT EXISTS button_signals (
          button_id INTEGER PRIMARY KEY REFERENCES buttons(id) ON DELETE CASCADE,
          encoding TEXT NOT NULL,
          press_initial TEXT NOT NULL,
          press_repeat TEXT NULL,
          hold_initial TEXT NULL,
          hold_repeat TEXT NULL,
          hold_gap_us INTEGER NULL,
          sample_count_press INTEGER NOT NULL,
          sample_count_hold INTEGER NOT NULL,
          quality_score_press REAL NULL,
          quality_score_hold REAL NULL,
          created_at REAL NOT NULL,
          updated_at REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS captures (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          button_id INTEGER NOT NULL REFERENCES buttons(id) ON DELETE CASCADE,
          mode TEXT NOT NULL,
          take_index INTEGER NOT NULL,
          raw_text TEXT NOT NULL,
          created_at REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_captures_button_id ON captures(button_id);

        CREATE TABLE IF NOT EXISTS agents (
          agent_id TEXT PRIMARY KEY,
          name TEXT NULL,
          transport TEXT NOT NULL,
          status TEXT NOT NULL,
          can_send INTEGER NOT NULL DEFAULT 0,
          can_learn INTEGER NOT NULL DEFAULT 0,
          pending INTEGER NOT NULL DEFAULT 0,
          pairing_session_id TEXT NULL,
          sw_version TEXT NULL,
          agent_topic TEXT NULL,
          configuration_url TEXT NULL,
          icon TEXT NULL,
          last_seen REAL NULL,
          created_at REAL NOT NULL,
          updated_at REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_settings (
          key TEXT PRIMARY KEY,
          value TEXT NULL,
          updated_at REAL NOT NULL
        );
        "#,
      )
      .map_err(db_err)?;
    Ok(())
  }
}

/// Converts a `rusqlite::Error` into a `DomainError`. The catalog never
/// leaks `rusqlite` types past its own module boundary, matching the
/// teacher's `InMemoryDatabaseError::From<PoisonError<T>>` pattern of
/// translating a backing-store failure into the crate's own error type.
pub(crate) fn db_err(err: rusqlite::Error) -> DomainError {
  DomainError::new(irhub_core::error::ErrorKind::Internal, "db_error", err.to_string())
}
