//! Wire protocol: one JSON envelope per text frame.
//!
//! The relay only understands the routing header (`type`, `roomId`,
//! `deviceId`, `targetId`) plus the two payloads it produces or consumes
//! itself (join and presence). Everything else travels as an opaque
//! `RawValue` and is never deserialized by the relay.
//!
//! Parsers are panic-free: malformed input is reported as `SignalError`.

pub mod envelope;
pub mod presence;

pub use envelope::{kind, Envelope};
pub use presence::{JoinPayload, MemberInfo, MemberStatus};
