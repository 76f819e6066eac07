//! Text frame decoding and join handshake extraction.

use signalroom_core::error::{Result, SignalError};
use signalroom_core::protocol::{Envelope, JoinPayload};

use crate::relay::PeerIdentity;

pub fn decode(text: &str) -> Result<Envelope> {
    Envelope::from_json(text)
}

/// Resolve the identity a `join` asks for.
///
/// `deviceId` comes from the payload, falling back to the envelope field;
/// `displayName` falls back to the device id. An unparseable payload counts
/// as an empty one.
pub fn join_identity(env: &Envelope, joined_at: i64) -> Result<PeerIdentity> {
    let payload: JoinPayload = env
        .payload
        .as_ref()
        .and_then(|raw| serde_json::from_str(raw.get()).ok())
        .unwrap_or_default();

    if env.room_id.trim().is_empty() {
        return Err(SignalError::BadRequest("join requires roomId".into()));
    }

    let mut device_id = payload.device_id;
    if device_id.is_empty() {
        device_id = env.device_id.clone().unwrap_or_default();
    }
    if device_id.is_empty() {
        return Err(SignalError::BadRequest("join requires deviceId".into()));
    }

    let display_name = if payload.display_name.is_empty() {
        device_id.clone()
    } else {
        payload.display_name
    };

    Ok(PeerIdentity {
        room_id: env.room_id.clone(),
        device_id,
        display_name,
        joined_at,
    })
}
