//! Error type shared by the protocol layer and the gateway.
//!
//! Connection-level failures are logged where they happen and never reach a
//! client as a frame; `ClientCode` only surfaces in HTTP rejections and in
//! the process exit log.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignalError>;

#[derive(Debug, Error)]
pub enum SignalError {
    /// Malformed frame, invalid join, or invalid configuration value.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Handshake refused by origin policy.
    #[error("not allowed: {0}")]
    NotAllowed(String),
    /// Handshake refused by the per-client window.
    #[error("rate limited")]
    RateLimited,
    /// Config file declares a schema version this build does not read.
    #[error("unsupported config version")]
    UnsupportedVersion,
    /// The hub event queue is gone; nothing can be registered or relayed.
    #[error("relay hub closed")]
    HubClosed,
    #[error("internal: {0}")]
    Internal(String),
}

impl SignalError {
    pub fn client_code(&self) -> ClientCode {
        match self {
            SignalError::BadRequest(_) => ClientCode::BadRequest,
            SignalError::NotAllowed(_) => ClientCode::NotAllowed,
            SignalError::RateLimited => ClientCode::RateLimited,
            SignalError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            SignalError::HubClosed => ClientCode::Unavailable,
            SignalError::Internal(_) => ClientCode::Internal,
        }
    }

    /// True when the request itself was at fault rather than the server.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self.client_code(),
            ClientCode::BadRequest
                | ClientCode::NotAllowed
                | ClientCode::RateLimited
        )
    }
}

/// Stable, upper-snake error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    BadRequest,
    NotAllowed,
    RateLimited,
    UnsupportedVersion,
    Unavailable,
    Internal,
}

impl ClientCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotAllowed => "NOT_ALLOWED",
            ClientCode::RateLimited => "RATE_LIMITED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Unavailable => "UNAVAILABLE",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ClientCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
