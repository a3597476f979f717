//! Control payload envelope
//!
//! JSON payloads pushed to the originating exchange during establishment
//! and teardown, plus the CoAP option number that carries the correlation
//! token.

use bridge_core::SessionToken;
use serde::{Deserialize, Serialize};

/// CoAP option number carrying the session token on correlated exchanges
pub const SESSION_TOKEN_OPTION: u16 = 111;

/// Error payload value: the concurrent-session limit was reached
pub const ERROR_CAPACITY_EXCEEDED: &str = "capacity-exceeded";
/// Error payload value: the exchange was neither correlated nor subscribe-style
pub const ERROR_PROTOCOL_VIOLATION: &str = "protocol-violation";
/// Error payload value: the duplex connection failed
pub const ERROR_REMOTE_TRANSPORT: &str = "remote-transport-error";

/// First establishment payload: conveys the new session's token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEstablished {
    pub id: SessionToken,
}

impl SessionEstablished {
    #[must_use]
    pub fn new(id: SessionToken) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Second establishment payload: the duplex connection is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReady {
    pub status: u8,
}

impl ChannelReady {
    #[must_use]
    pub fn new() -> Self {
        Self { status: 0 }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

impl Default for ChannelReady {
    fn default() -> Self {
        Self::new()
    }
}

/// Error payload answered inline or pushed before teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    #[must_use]
    pub fn capacity_exceeded() -> Self {
        Self {
            error: ERROR_CAPACITY_EXCEEDED.to_string(),
        }
    }

    #[must_use]
    pub fn protocol_violation() -> Self {
        Self {
            error: ERROR_PROTOCOL_VIOLATION.to_string(),
        }
    }

    #[must_use]
    pub fn remote_transport() -> Self {
        Self {
            error: ERROR_REMOTE_TRANSPORT.to_string(),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
