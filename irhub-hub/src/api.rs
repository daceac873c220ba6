//! HTTP/WebSocket API surface.
//!
//! Grounded on `cdp_api/src/api.rs`: a small `Api` struct holding
//! everything a handler might need, `web::Data`-injected into an
//! `actix_web::App`, with routes registered in one place and bound to
//! every configured address. Generalized from the teacher's single
//! `index` route to the full set spec.md's HTTP surface requires, and
//! from `App::data` (actix-web 3) to `App::app_data(web::Data::new(..))`
//! (actix-web 4).

mod handlers;
mod ws;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};

use irhub_core::cipher::SettingsCipher;

use crate::broadcaster::StatusBroadcaster;
use crate::db::Catalog;
use crate::learning::LearningService;
use crate::logs::LogHub;
use crate::pairing::PairingHub;
use crate::registry::AgentRegistry;
use crate::sender::IrSenderService;

/// Everything an HTTP handler might need, shared behind `Arc`s across
/// every worker thread. Mirrors the teacher's `Api<D>` shape, generalized
/// from one `db: D` field to the full set of services this hub wires
/// together.
#[derive(Clone)]
pub struct AppState {
  pub catalog: Arc<Catalog>,
  pub registry: Arc<AgentRegistry>,
  pub pairing: Arc<PairingHub>,
  pub logs: Arc<LogHub>,
  pub broadcaster: Arc<StatusBroadcaster>,
  pub learning: Arc<LearningService>,
  pub sender: Arc<IrSenderService>,
  pub cipher: Option<Arc<SettingsCipher>>,
}

/// Binds to every configured address and runs until shut down.
pub async fn run_server(state: AppState, binds: &[String]) -> std::io::Result<()> {
  let data = web::Data::new(state);
  let mut server = HttpServer::new(move || {
    App::new()
      .app_data(data.clone())
      .route("/", web::get().to(handlers::index))
      .route("/health", web::get().to(handlers::health))
      .service(
        web::scope("/remotes")
          .route("", web::get().to(handlers::list_remotes))
          .route("", web::post().to(handlers::create_remote))
          .route("/{remote_id}", web::get().to(handlers::get_remote))
          .route("/{remote_id}", web::put().to(handlers::update_remote))
          .route("/{remote_id}", web::delete().to(handlers::delete_remote))
          .route("/{remote_id}/buttons", web::get().to(handlers::list_buttons)),
      )
      .service(
        web::scope("/buttons")
          .route("/{button_id}", web::delete().to(handlers::delete_button))
          .route("/{button_id}", web::put().to(handlers::rename_button))
          .route("/{button_id}/signals", web::get().to(handlers::get_button_signals))
          .route("/{button_id}/send", web::post().to(handlers::send_button)),
      )
      .service(
        web::scope("/agents")
          .route("", web::get().to(handlers::list_agents))
          .route("/{agent_id}", web::put().to(handlers::update_agent))
          .route("/{agent_id}/accept", web::post().to(handlers::accept_agent))
          .route("/{agent_id}/unpair", web::post().to(handlers::unpair_agent)),
      )
      .service(
        web::scope("/pairing")
          .route("", web::get().to(handlers::pairing_status))
          .route("/open", web::post().to(handlers::open_pairing))
          .route("/close", web::post().to(handlers::close_pairing)),
      )
      .service(
        web::scope("/learning")
          .route("", web::get().to(handlers::learning_status))
          .route("/start", web::post().to(handlers::start_learning))
          .route("/stop", web::post().to(handlers::stop_learning))
          .route("/capture/press", web::post().to(handlers::capture_press))
          .route("/capture/hold", web::post().to(handlers::capture_hold)),
      )
      .service(
        web::scope("/settings")
          .route("", web::get().to(handlers::get_settings))
          .route("", web::put().to(handlers::update_settings))
          .route("/secrets/{key}", web::put().to(handlers::set_secret)),
      )
      .route("/ws/status", web::get().to(ws::status_ws))
      .route("/ws/logs/{agent_id}", web::get().to(ws::logs_ws))
  });
  for addr in binds {
    tracing::info!(addr, "binding hub HTTP API");
    server = server.bind(addr)?;
  }
  tracing::info!("hub API is up");
  server.run().await
}
