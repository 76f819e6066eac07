//! signalroom gateway library entry.
//!
//! This crate wires the transport, origin policy, handshake limiter and the
//! relay hub into one HTTP service. It is consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod relay;
pub mod router;
pub mod transport;
