//! Transport layer (WebSocket).
//!
//! Exposes the upgrade endpoint, the per-connection reader/writer pair, the
//! frame codec, and the pre-upgrade handshake limiter.

pub mod codec;
pub mod handshake;
pub mod session;
pub mod ws;
