//! Room registry and message relay engine.
//!
//! All membership mutation happens inside one control loop ([`Hub::run`]);
//! connections talk to it only through [`HubHandle`]. Outbound delivery is
//! non-blocking: a member whose queue is full is evicted on the spot.

pub mod hub;
pub mod presence;
pub mod registry;
pub mod types;

pub use hub::{Hub, HubEvent, HubHandle, HubStats};
pub use registry::{RelayOutcome, Registry};
pub use types::{ConnId, Peer, PeerIdentity, PreparedMsg};
