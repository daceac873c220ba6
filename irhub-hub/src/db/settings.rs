//! App settings table: plain key/value UI settings plus cipher-backed
//! secrets (C14). Grounded on
//! `original_source/backend/database/schemas/settings.py` for the plain
//! key/value shape and `helper/settings_cipher.py` for the encrypted path.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use irhub_core::cipher::{master_key_missing, SettingsCipher};
use irhub_core::error::DomainError;

use super::{db_err, Catalog};

const MQTT_USERNAME_KEY: &str = "mqtt_username";
const MQTT_PASSWORD_CIPHERTEXT_KEY: &str = "mqtt_password_ciphertext";
const MQTT_PASSWORD_NONCE_KEY: &str = "mqtt_password_nonce";

#[derive(Clone, Debug, Serialize)]
pub struct UiSettings {
  pub theme: String,
  pub language: String,
}

/// MQTT credentials resolved from stored settings, used to build the
/// hub's broker connection. Mirrors `RuntimeLoader._load_runtime_settings`:
/// when no cipher is configured, credentials are simply absent rather than
/// an error.
#[derive(Clone, Debug, Default)]
pub struct RuntimeSettings {
  pub mqtt_username: Option<String>,
  pub mqtt_password: Option<String>,
}

impl Catalog {
  pub fn get_setting(&self, key: &str) -> Result<Option<String>, DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    conn.query_row("SELECT value FROM app_settings WHERE key = ?1", params![key], |r| r.get(0)).optional().map_err(db_err)
  }

  pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DomainError> {
    let conn = self.conn.lock().expect("catalog connection poisoned");
    let now = Utc::now().timestamp() as f64;
    conn
      .execute(
        "INSERT INTO app_settings(key, value, updated_at) VALUES(?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
      )
      .map_err(db_err)?;
    Ok(())
  }

  pub fn get_ui_settings(&self) -> Result<UiSettings, DomainError> {
    Ok(UiSettings {
      theme: self.get_setting("ui.theme")?.unwrap_or_else(|| "system".to_owned()),
      language: self.get_setting("ui.language")?.unwrap_or_else(|| "en".to_owned()),
    })
  }

  pub fn update_ui_settings(&self, theme: Option<&str>, language: Option<&str>) -> Result<UiSettings, DomainError> {
    if let Some(theme) = theme {
      self.set_setting("ui.theme", theme)?;
    }
    if let Some(language) = language {
      self.set_setting("ui.language", language)?;
    }
    self.get_ui_settings()
  }

  /// Stores `value` encrypted under `cipher`, or errors if no cipher is
  /// configured (`settings_master_key_missing`).
  pub fn set_encrypted_setting(&self, key: &str, value: &str, cipher: Option<&SettingsCipher>) -> Result<(), DomainError> {
    let cipher = cipher.ok_or_else(master_key_missing)?;
    let encrypted = cipher.encrypt(value)?;
    self.set_setting(key, &encrypted)
  }

  pub fn get_decrypted_setting(&self, key: &str, cipher: Option<&SettingsCipher>) -> Result<Option<String>, DomainError> {
    let Some(stored) = self.get_setting(key)? else {
      return Ok(None);
    };
    let cipher = cipher.ok_or_else(master_key_missing)?;
    Ok(Some(cipher.decrypt(&stored)?))
  }

  /// Stores the MQTT broker password as a dedicated ciphertext/nonce pair
  /// (distinct from the generic combined-blob secret keys `set_encrypted_setting`
  /// writes), matching the original's `mqtt_password` field on `Settings.set`.
  pub fn set_mqtt_password(&self, plaintext: &str, cipher: Option<&SettingsCipher>) -> Result<(), DomainError> {
    let cipher = cipher.ok_or_else(master_key_missing)?;
    let (ciphertext, nonce) = cipher.encrypt_parts(plaintext)?;
    self.set_setting(MQTT_PASSWORD_CIPHERTEXT_KEY, &ciphertext)?;
    self.set_setting(MQTT_PASSWORD_NONCE_KEY, &nonce)
  }

  pub fn set_mqtt_username(&self, username: &str) -> Result<(), DomainError> {
    self.set_setting(MQTT_USERNAME_KEY, username)
  }

  /// Resolves the MQTT credentials the hub's broker connection should use.
  /// With no cipher configured, or no password ever stored, the password is
  /// simply absent rather than an error — matches
  /// `RuntimeLoader._load_runtime_settings` returning `{}` when the
  /// settings store or cipher isn't available.
  pub fn get_runtime_settings(&self, cipher: Option<&SettingsCipher>) -> Result<RuntimeSettings, DomainError> {
    let mqtt_username = self.get_setting(MQTT_USERNAME_KEY)?;
    let mqtt_password = match (cipher, self.get_setting(MQTT_PASSWORD_CIPHERTEXT_KEY)?, self.get_setting(MQTT_PASSWORD_NONCE_KEY)?) {
      (Some(cipher), Some(ciphertext), Some(nonce)) => Some(cipher.decrypt_parts(&ciphertext, &nonce)?),
      _ => None,
    };
    Ok(RuntimeSettings { mqtt_username, mqtt_password })
  }
}
