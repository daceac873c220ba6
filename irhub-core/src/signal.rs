//! Pulse codec, aggregation, hold extraction, gap estimation, sender
//! computations, and the hardware engine — the C1-C4/C13 components.

pub mod aggregator;
pub mod codec;
pub mod engine;
pub mod gap;
pub mod hold;
pub mod sender;
