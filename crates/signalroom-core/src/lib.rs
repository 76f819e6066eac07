//! signalroom core: transport-agnostic wire types and the shared error type.
//!
//! This crate defines the JSON envelope that clients exchange through the
//! relay, the join and presence payloads the relay itself understands, and the
//! error surface shared with the gateway. It carries no transport or runtime
//! dependencies so it can be reused by clients and test tooling.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `SignalError`/`Result` so a malformed frame
//! can never bring a connection task down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, SignalError};
