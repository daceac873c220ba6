//! Shared domain logic for the IR remote-control fabric.
//!
//! This crate has no network or filesystem dependencies of its own: it is
//! the pure/algorithmic core (pulse codec, aggregation, hold extraction,
//! version compatibility, settings cipher, log sanitization) plus the wire
//! message shapes both the hub and the agent serialize over MQTT. Both
//! `irhub-hub` and `irhub-agent` link against it.

pub mod cipher;
pub mod error;
pub mod log;
pub mod protocol;
pub mod signal;
pub mod version;

pub use error::{DomainError, ErrorKind};
