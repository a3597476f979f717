//! Bridge error taxonomy
//!
//! Classification and lifecycle failures of the session bridge. Transport
//! failures carry their own error types on the collaborator traits.

use crate::session::SessionToken;

/// Errors raised while classifying exchanges and managing sessions
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The concurrent-session limit has been reached; answered inline,
    /// no session is created.
    #[error("concurrent session limit reached")]
    AdmissionRejected,

    /// The exchange carries no correlation token and is not a
    /// subscribe-style request; answered inline, no session is created.
    #[error("exchange is neither correlated nor subscribe-style")]
    ProtocolViolation,

    /// An id collision in the registry. Should not occur under correct id
    /// generation; fatal to the attempt, never to the process.
    #[error("session {0} already registered")]
    DuplicateSession(SessionToken),

    /// The session limit must be a positive integer.
    #[error("invalid session limit: {0}")]
    InvalidLimit(usize),

    /// The duplex connection failed after the session was live.
    #[error("remote transport error: {0}")]
    RemoteTransport(String),
}

impl BridgeError {
    /// Check whether this error is answered inline to the requesting peer
    /// without touching shared state.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::AdmissionRejected | Self::ProtocolViolation)
    }
}
