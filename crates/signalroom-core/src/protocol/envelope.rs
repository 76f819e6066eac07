//! Routing envelope (JSON text frame).
//!
//! `payload` is kept as `RawValue` so SDP blobs, ICE candidates and file
//! descriptors pass through byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{Result, SignalError};

/// Well-known message types.
///
/// The set is open: unknown types are relayed verbatim.
pub mod kind {
    pub const JOIN: &str = "join";
    pub const OFFER: &str = "offer";
    pub const ANSWER: &str = "answer";
    pub const CANDIDATE: &str = "candidate";
    pub const FILE_META: &str = "file-meta";
    pub const FILE_REQUEST: &str = "file-request";
    pub const MEMBER_JOINED: &str = "member-joined";
    pub const MEMBER_LEFT: &str = "member-left";
    pub const MEMBER_LIST: &str = "member-list";

    /// Presence types are produced by the relay only.
    pub fn is_presence(msg_type: &str) -> bool {
        matches!(msg_type, MEMBER_JOINED | MEMBER_LEFT | MEMBER_LIST)
    }
}

/// One signaling message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Room the message is scoped to.
    #[serde(default)]
    pub room_id: String,
    /// Sender device. Overwritten by the relay before forwarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Directed recipient; absent or empty means broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Opaque payload, stored as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
}

impl Envelope {
    /// Parse a text frame.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| SignalError::BadRequest(format!("invalid envelope json: {e}")))
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SignalError::Internal(format!("envelope encode failed: {e}")))
    }

    /// Directed recipient, if any. An empty `targetId` counts as none.
    pub fn target(&self) -> Option<&str> {
        self.target_id.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_join(&self) -> bool {
        self.msg_type == kind::JOIN
    }

    /// Replace whatever sender id the client claimed with the real one.
    pub fn stamp_sender(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_owned());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn empty_target_is_broadcast() {
        let env = Envelope::from_json(r#"{"type":"offer","roomId":"abc","targetId":""}"#).unwrap();
        assert_eq!(env.target(), None);

        let env = Envelope::from_json(r#"{"type":"offer","roomId":"abc","targetId":"Y"}"#).unwrap();
        assert_eq!(env.target(), Some("Y"));
    }

    #[test]
    fn stamp_overwrites_claimed_sender() {
        let mut env =
            Envelope::from_json(r#"{"type":"candidate","roomId":"abc","deviceId":"spoofed"}"#).unwrap();
        env.stamp_sender("X");
        let out = env.to_json().unwrap();
        assert!(out.contains(r#""deviceId":"X""#));
        assert!(!out.contains("spoofed"));
    }

    #[test]
    fn payload_passes_through_verbatim() {
        let raw = r#"{"type":"file-meta","roomId":"r","payload":{"name":"a.txt","size":12,"chunks":[1, 2]}}"#;
        let env = Envelope::from_json(raw).unwrap();
        let out = env.to_json().unwrap();
        assert!(out.contains(r#""payload":{"name":"a.txt","size":12,"chunks":[1, 2]}"#));
        assert!(!out.contains("targetId"));
    }

    #[test]
    fn presence_types_are_reserved() {
        assert!(kind::is_presence("member-list"));
        assert!(!kind::is_presence("offer"));
    }
}
