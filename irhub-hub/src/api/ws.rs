//! WebSocket endpoints: a live status feed and a per-agent log feed.
//!
//! The teacher has no WebSocket surface of its own (`cdp_api` is plain
//! HTTP); this is grounded on the fan-out shape spec.md §C.11/C.15
//! describe and built with `actix-ws`, the natural actix-web 4
//! counterpart to the broadcast channels in [`crate::logs`] and
//! [`crate::broadcaster`]. Each connection gets its own spawned task that
//! forwards broadcast messages to the socket until the peer disconnects.

use actix_web::{web, Error, HttpRequest, HttpResponse};
use futures::StreamExt;

use super::AppState;

pub(crate) async fn status_ws(req: HttpRequest, stream: web::Payload, state: web::Data<AppState>) -> Result<HttpResponse, Error> {
  let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
  let mut updates = state.broadcaster.subscribe();

  actix_web::rt::spawn(async move {
    loop {
      tokio::select! {
        update = updates.recv() => {
          let Ok(snapshot) = update else { break };
          let Ok(text) = serde_json::to_string(&snapshot) else { continue };
          if session.text(text).await.is_err() {
            break;
          }
        }
        incoming = msg_stream.next() => {
          match incoming {
            Some(Ok(actix_ws::Message::Ping(bytes))) => {
              if session.pong(&bytes).await.is_err() {
                break;
              }
            }
            Some(Ok(actix_ws::Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
          }
        }
      }
    }
    let _ = session.close(None).await;
  });

  Ok(response)
}

pub(crate) async fn logs_ws(req: HttpRequest, stream: web::Payload, state: web::Data<AppState>, agent_id: web::Path<String>) -> Result<HttpResponse, Error> {
  let agent_id = agent_id.into_inner();
  if !state.logs.can_stream_agent(&agent_id) {
    return Ok(HttpResponse::NotFound().json(serde_json::json!({ "code": "not_found", "message": "unknown or offline agent_id" })));
  }

  let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
  for event in state.logs.snapshot(&agent_id, 100) {
    if let Ok(text) = serde_json::to_string(&event) {
      let _ = session.text(text).await;
    }
  }
  let mut events = state.logs.subscribe(&agent_id);

  actix_web::rt::spawn(async move {
    loop {
      tokio::select! {
        update = events.recv() => {
          let Ok(event) = update else { break };
          let Ok(text) = serde_json::to_string(&event) else { continue };
          if session.text(text).await.is_err() {
            break;
          }
        }
        incoming = msg_stream.next() => {
          match incoming {
            Some(Ok(actix_ws::Message::Ping(bytes))) => {
              if session.pong(&bytes).await.is_err() {
                break;
              }
            }
            Some(Ok(actix_ws::Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
          }
        }
      }
    }
    let _ = session.close(None).await;
  });

  Ok(response)
}
