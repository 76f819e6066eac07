use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use signalroom_core::error::Result;
use signalroom_core::protocol::Envelope;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection id. Distinct from `deviceId`, which is
/// client-chosen and may repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl ConnId {
    pub fn next() -> Self {
        ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Identity fixed by the join handshake; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub room_id: String,
    pub device_id: String,
    pub display_name: String,
    /// Unix epoch milliseconds.
    pub joined_at: i64,
}

/// A joined connection handed to the hub.
///
/// `tx` is the only sender of the connection's outbound queue, so the hub
/// closes the queue by dropping it.
#[derive(Debug)]
pub struct Peer {
    pub conn_id: ConnId,
    pub identity: Arc<PeerIdentity>,
    pub tx: mpsc::Sender<PreparedMsg>,
}

/// Message serialized once and shared by every recipient.
#[derive(Debug, Clone)]
pub struct PreparedMsg(Arc<str>);

impl PreparedMsg {
    pub fn from_envelope(env: &Envelope) -> Result<Self> {
        Ok(PreparedMsg(env.to_json()?.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to axum::ws::Message for transport.
    pub fn to_ws_message(&self) -> Message {
        Message::Text(self.0.to_string())
    }
}
