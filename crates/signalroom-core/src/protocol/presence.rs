//! Join and presence payloads.

use serde::{Deserialize, Serialize};

/// `join` payload. Both fields may be omitted by older clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub display_name: String,
}

/// Presence status. Snapshots only ever carry `Online`; `Offline` appears
/// solely in the transient `member-left` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Online,
    Offline,
}

/// One room member as reported in presence events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub device_id: String,
    pub display_name: String,
    /// Unix epoch milliseconds.
    pub joined_at: i64,
    pub status: MemberStatus,
}
