//! Request/response transport contract
//!
//! One `InboundExchange` per inbound request. The reply handle outlives
//! classification: for subscribe-style exchanges the session keeps it for
//! the whole relay lifetime and uses it only to push data and to trigger
//! reset.

use crate::session::SessionToken;
use async_trait::async_trait;
use std::sync::Arc;

/// Errors surfaced by the request/response transport while replying
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The originating peer is no longer reachable.
    #[error("originating peer is gone")]
    PeerGone,

    /// The transport failed to deliver the payload.
    #[error("exchange transport failure: {0}")]
    Transport(String),
}

/// Reply side of an inbound exchange
///
/// `push` delivers a payload without completing the exchange, supporting
/// the two-stage establishment handshake and ongoing notifications.
/// `complete` is the graceful final response; `abort` carries reset
/// semantics and is the only way to terminate the exchange abnormally.
#[async_trait]
pub trait ExchangeResponder: Send + Sync {
    /// Push a payload to the peer without completing the exchange
    async fn push(&self, payload: &[u8]) -> Result<(), ExchangeError>;

    /// Complete the exchange with a final payload
    async fn complete(&self, payload: &[u8]) -> Result<(), ExchangeError>;

    /// Abort the exchange; idempotent, never graceful completion
    async fn abort(&self);
}

/// A decoded inbound exchange, ready for classification
pub struct InboundExchange {
    /// Correlation token carried by the exchange, if any
    pub token: Option<SessionToken>,
    /// Whether the exchange asks for an ongoing stream of pushes
    pub subscribe: bool,
    /// Full request payload
    pub payload: Vec<u8>,
    /// Reply handle back to the originating peer
    pub responder: Arc<dyn ExchangeResponder>,
}

impl std::fmt::Debug for InboundExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundExchange")
            .field("token", &self.token)
            .field("subscribe", &self.subscribe)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
