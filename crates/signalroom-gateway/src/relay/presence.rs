//! Presence derivation.
//!
//! Nothing here is stored: member info is computed from the identities held
//! in the room map whenever membership changes.

use serde::Serialize;
use serde_json::value::to_raw_value;

use signalroom_core::error::{Result, SignalError};
use signalroom_core::protocol::{kind, Envelope, MemberInfo, MemberStatus};

use super::types::{PeerIdentity, PreparedMsg};

pub fn member_info(identity: &PeerIdentity, status: MemberStatus) -> MemberInfo {
    MemberInfo {
        device_id: identity.device_id.clone(),
        display_name: identity.display_name.clone(),
        joined_at: identity.joined_at,
        status,
    }
}

/// `member-joined` for existing members when `identity` joins.
pub fn member_joined(identity: &PeerIdentity) -> Result<PreparedMsg> {
    let info = member_info(identity, MemberStatus::Online);
    prepare(kind::MEMBER_JOINED, &identity.room_id, Some(&identity.device_id), &info)
}

/// `member-left` for remaining members when `identity` departs.
pub fn member_left(identity: &PeerIdentity) -> Result<PreparedMsg> {
    let info = member_info(identity, MemberStatus::Offline);
    prepare(kind::MEMBER_LEFT, &identity.room_id, Some(&identity.device_id), &info)
}

/// Full `member-list` snapshot. Listed members are online by definition.
pub fn member_list<'a, I>(room_id: &str, members: I) -> Result<PreparedMsg>
where
    I: IntoIterator<Item = &'a PeerIdentity>,
{
    let list: Vec<MemberInfo> = members
        .into_iter()
        .map(|m| member_info(m, MemberStatus::Online))
        .collect();
    prepare(kind::MEMBER_LIST, room_id, None, &list)
}

fn prepare<T: Serialize>(
    msg_type: &str,
    room_id: &str,
    device_id: Option<&str>,
    payload: &T,
) -> Result<PreparedMsg> {
    let payload = to_raw_value(payload)
        .map_err(|e| SignalError::Internal(format!("presence encode failed: {e}")))?;
    let env = Envelope {
        msg_type: msg_type.to_string(),
        room_id: room_id.to_string(),
        device_id: device_id.map(str::to_string),
        target_id: None,
        payload: Some(payload),
    };
    PreparedMsg::from_envelope(&env)
}
