//! Per-session relay
//!
//! One `RelayChannel` and one relay task per admitted session. The channel
//! holds the session's shared state; the task owns the duplex connection
//! halves and drives every state transition.

mod channel;
mod establish;

pub use channel::RelayChannel;
pub(crate) use establish::run_session;

/// Buffered payloads queued toward the remote peer per session
pub(crate) const OUTBOUND_BUFFER_SIZE: usize = 64;
