//! Request handlers. Thin: every handler parses its input, delegates to a
//! service or catalog method, and maps the `Result<_, DomainError>` to an
//! HTTP response. Grounded on `cdp_api/src/api/handlers.rs`'s
//! `web::Data<D>`-injected free functions, generalized from the teacher's
//! single `index` handler to the full CRUD/command surface spec.md needs.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use irhub_core::error::DomainError;
use irhub_core::protocol::SendMode;

use super::AppState;

fn error_response(err: DomainError) -> HttpResponse {
  HttpResponse::build(actix_web::http::StatusCode::from_u16(err.status_code()).unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR))
    .json(json!({ "code": err.code, "message": err.message }))
}

fn ok_or_error<T: Serialize>(result: Result<T, DomainError>) -> HttpResponse {
  match result {
    Ok(value) => HttpResponse::Ok().json(value),
    Err(err) => error_response(err),
  }
}

pub(crate) async fn index() -> HttpResponse {
  HttpResponse::Ok().body("irhub is up")
}

pub(crate) async fn health(state: web::Data<AppState>) -> HttpResponse {
  HttpResponse::Ok().json(json!({
    "ok": true,
    "pairing_open": state.pairing.status().open,
  }))
}

// ---------------------------------------------------------------------
// Remotes
// ---------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct RemoteUpsertBody {
  name: String,
  #[serde(default)]
  icon: Option<String>,
  #[serde(default)]
  carrier_hz: Option<i64>,
  #[serde(default)]
  duty_cycle: Option<i64>,
}

pub(crate) async fn list_remotes(state: web::Data<AppState>) -> HttpResponse {
  ok_or_error(state.catalog.list_remotes())
}

pub(crate) async fn create_remote(state: web::Data<AppState>, body: web::Json<RemoteUpsertBody>) -> HttpResponse {
  ok_or_error(state.catalog.create_remote(&body.name, body.icon.as_deref(), body.carrier_hz, body.duty_cycle))
}

pub(crate) async fn get_remote(state: web::Data<AppState>, remote_id: web::Path<i64>) -> HttpResponse {
  ok_or_error(state.catalog.get_remote(*remote_id))
}

pub(crate) async fn update_remote(state: web::Data<AppState>, remote_id: web::Path<i64>, body: web::Json<RemoteUpsertBody>) -> HttpResponse {
  ok_or_error(state.catalog.update_remote(*remote_id, &body.name, body.icon.as_deref(), body.carrier_hz, body.duty_cycle))
}

pub(crate) async fn delete_remote(state: web::Data<AppState>, remote_id: web::Path<i64>) -> HttpResponse {
  ok_or_error(state.catalog.delete_remote(*remote_id))
}

pub(crate) async fn list_buttons(state: web::Data<AppState>, remote_id: web::Path<i64>) -> HttpResponse {
  ok_or_error(state.catalog.list_buttons(*remote_id))
}

// ---------------------------------------------------------------------
// Buttons
// ---------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct RenameButtonBody {
  name: String,
}

pub(crate) async fn rename_button(state: web::Data<AppState>, button_id: web::Path<i64>, body: web::Json<RenameButtonBody>) -> HttpResponse {
  ok_or_error(state.catalog.rename_button(*button_id, &body.name))
}

pub(crate) async fn delete_button(state: web::Data<AppState>, button_id: web::Path<i64>) -> HttpResponse {
  ok_or_error(state.catalog.delete_button(*button_id))
}

pub(crate) async fn get_button_signals(state: web::Data<AppState>, button_id: web::Path<i64>) -> HttpResponse {
  match state.catalog.get_signals(*button_id) {
    Ok(Some(signals)) => HttpResponse::Ok().json(signals),
    Ok(None) => error_response(DomainError::not_found("button has no stored signals")),
    Err(err) => error_response(err),
  }
}

#[derive(Deserialize)]
pub(crate) struct SendButtonBody {
  mode: SendMode,
  #[serde(default)]
  hold_ms: Option<u32>,
}

pub(crate) async fn send_button(state: web::Data<AppState>, button_id: web::Path<i64>, body: web::Json<SendButtonBody>) -> HttpResponse {
  ok_or_error(state.sender.send(*button_id, body.mode, body.hold_ms).await)
}

// ---------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------

pub(crate) async fn list_agents(state: web::Data<AppState>) -> HttpResponse {
  ok_or_error(state.catalog.list_agents())
}

#[derive(Deserialize)]
pub(crate) struct UpdateAgentBody {
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  configuration_url: Option<String>,
}

pub(crate) async fn update_agent(state: web::Data<AppState>, agent_id: web::Path<String>, body: web::Json<UpdateAgentBody>) -> HttpResponse {
  ok_or_error(state.catalog.update_agent_name_url(&agent_id, body.name.as_deref(), body.configuration_url.as_deref()))
}

pub(crate) async fn accept_agent(state: web::Data<AppState>, agent_id: web::Path<String>) -> HttpResponse {
  ok_or_error(state.pairing.accept_offer(&agent_id).await)
}

pub(crate) async fn unpair_agent(state: web::Data<AppState>, agent_id: web::Path<String>) -> HttpResponse {
  ok_or_error(state.pairing.unpair_and_delete_agent(&agent_id).await)
}

// ---------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------

pub(crate) async fn pairing_status(state: web::Data<AppState>) -> HttpResponse {
  HttpResponse::Ok().json(state.pairing.status())
}

#[derive(Deserialize)]
pub(crate) struct OpenPairingBody {
  #[serde(default = "default_pairing_window")]
  duration_seconds: i64,
}

fn default_pairing_window() -> i64 {
  crate::pairing::DEFAULT_WINDOW_SECONDS
}

pub(crate) async fn open_pairing(state: web::Data<AppState>, body: Option<web::Json<OpenPairingBody>>) -> HttpResponse {
  let duration = body.map(|b| b.duration_seconds).unwrap_or_else(default_pairing_window);
  ok_or_error(state.pairing.open_pairing(duration).await)
}

pub(crate) async fn close_pairing(state: web::Data<AppState>) -> HttpResponse {
  ok_or_error(state.pairing.close_pairing().await)
}

// ---------------------------------------------------------------------
// Learning
// ---------------------------------------------------------------------

pub(crate) async fn learning_status(state: web::Data<AppState>) -> HttpResponse {
  HttpResponse::Ok().json(state.learning.status())
}

#[derive(Deserialize)]
pub(crate) struct StartLearningBody {
  remote_id: i64,
  #[serde(default)]
  extend: bool,
}

pub(crate) async fn start_learning(state: web::Data<AppState>, body: web::Json<StartLearningBody>) -> HttpResponse {
  ok_or_error(state.learning.start(body.remote_id, body.extend))
}

pub(crate) async fn stop_learning(state: web::Data<AppState>) -> HttpResponse {
  HttpResponse::Ok().json(state.learning.stop())
}

#[derive(Deserialize)]
pub(crate) struct CapturePressBody {
  remote_id: i64,
  #[serde(default)]
  takes: Option<u32>,
  timeout_ms: u64,
  #[serde(default)]
  overwrite: bool,
  #[serde(default)]
  button_name: Option<String>,
}

pub(crate) async fn capture_press(state: web::Data<AppState>, body: web::Json<CapturePressBody>) -> HttpResponse {
  let takes = body.takes.unwrap_or_else(|| 3);
  ok_or_error(state.learning.capture_press(body.remote_id, takes, body.timeout_ms, body.overwrite, body.button_name.as_deref()).await)
}

#[derive(Deserialize)]
pub(crate) struct CaptureHoldBody {
  remote_id: i64,
  timeout_ms: u64,
  #[serde(default)]
  overwrite: bool,
  #[serde(default)]
  button_name: Option<String>,
}

pub(crate) async fn capture_hold(state: web::Data<AppState>, body: web::Json<CaptureHoldBody>) -> HttpResponse {
  ok_or_error(state.learning.capture_hold(body.remote_id, body.timeout_ms, body.overwrite, body.button_name.as_deref()).await)
}

// ---------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------

pub(crate) async fn get_settings(state: web::Data<AppState>) -> HttpResponse {
  ok_or_error(state.catalog.get_ui_settings())
}

#[derive(Deserialize)]
pub(crate) struct UpdateSettingsBody {
  #[serde(default)]
  theme: Option<String>,
  #[serde(default)]
  language: Option<String>,
  #[serde(default)]
  mqtt_username: Option<String>,
  #[serde(default)]
  mqtt_password: Option<String>,
}

pub(crate) async fn update_settings(state: web::Data<AppState>, body: web::Json<UpdateSettingsBody>) -> HttpResponse {
  if let Some(username) = body.mqtt_username.as_deref() {
    if let Err(err) = state.catalog.set_mqtt_username(username) {
      return error_response(err);
    }
  }
  if let Some(password) = body.mqtt_password.as_deref() {
    if let Err(err) = state.catalog.set_mqtt_password(password, state.cipher.as_deref()) {
      return error_response(err);
    }
  }
  ok_or_error(state.catalog.update_ui_settings(body.theme.as_deref(), body.language.as_deref()))
}

#[derive(Deserialize)]
pub(crate) struct SetSecretBody {
  value: String,
}

pub(crate) async fn set_secret(state: web::Data<AppState>, key: web::Path<String>, body: web::Json<SetSecretBody>) -> HttpResponse {
  match state.catalog.set_encrypted_setting(&key, &body.value, state.cipher.as_deref()) {
    Ok(()) => HttpResponse::Ok().json(json!({ "ok": true })),
    Err(err) => error_response(err),
  }
}
