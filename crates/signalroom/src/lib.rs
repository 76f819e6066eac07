//! Top-level facade crate for signalroom.
//!
//! Re-exports the wire types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use signalroom_core::*;
}

pub mod gateway {
    pub use signalroom_gateway::*;
}
