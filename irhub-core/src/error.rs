//! Shared error taxonomy.
//!
//! Every subsystem in this workspace produces a [`DomainError`]: a short
//! machine-readable `code`, an `ErrorKind` used to pick an HTTP status or an
//! MQTT command-response status, and a human-readable message. This mirrors
//! `AgentRoutingError(code, message, status_code)` in the original Python
//! implementation (`agent_registry.py`, `agent_command_client_hub.py`) and
//! the teacher's per-module hand-rolled error enums
//! (`InMemoryDatabaseError`, `ApiConfigParseError`), generalized to a single
//! type with `thiserror`.

use thiserror::Error;

/// Broad classification of a [`DomainError`], used to pick a transport
/// status code (HTTP status on the hub's API, numeric status in an MQTT
/// command response).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
  /// The caller-supplied input failed validation.
  Validation,
  /// The referenced entity does not exist.
  NotFound,
  /// The operation conflicts with current state (e.g. a learning session
  /// already active, or an agent already bound).
  Conflict,
  /// A bounded wait (MQTT RPC, IR receive) elapsed with no result.
  Timeout,
  /// Resolving an operation to a concrete agent failed.
  AgentRouting,
  /// The IR hardware engine (`ir-ctl` subprocess) failed.
  EngineFailure,
  /// A cryptographic operation (settings cipher) failed.
  Crypto,
  /// A captured/stored pulse signal did not have the expected shape.
  SignalShape,
  /// Catch-all for unexpected internal failures.
  Internal,
}

impl ErrorKind {
  /// HTTP status code the hub's API surface should answer with.
  pub fn http_status(self) -> u16 {
    match self {
      ErrorKind::Validation => 400,
      ErrorKind::NotFound => 404,
      ErrorKind::Conflict => 409,
      ErrorKind::Timeout => 504,
      ErrorKind::AgentRouting => 503,
      ErrorKind::EngineFailure => 400,
      ErrorKind::Crypto => 400,
      ErrorKind::SignalShape => 400,
      ErrorKind::Internal => 500,
    }
  }
}

/// A domain-level error, carried across the HTTP boundary and the MQTT
/// command-response boundary alike.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct DomainError {
  /// Short machine-readable identifier, e.g. `"agent_timeout"`,
  /// `"validation_error"`. Mirrors the original's `error.code`.
  pub code: String,
  /// Human-readable detail.
  pub message: String,
  pub kind: ErrorKind,
}

impl DomainError {
  pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
    Self { code: code.into(), message: message.into(), kind }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Validation, "validation_error", message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::NotFound, "not_found", message)
  }

  pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Conflict, code, message)
  }

  pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Timeout, code, message)
  }

  pub fn agent_routing(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(ErrorKind::AgentRouting, code, message)
  }

  pub fn engine_failure(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::EngineFailure, "runtime_error", message)
  }

  pub fn crypto(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Crypto, code, message)
  }

  pub fn signal_shape(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::SignalShape, "signal_shape_error", message)
  }

  pub fn status_code(&self) -> u16 {
    self.kind.http_status()
  }
}
