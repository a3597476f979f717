//! Duplex transport contract
//!
//! One duplex connection per session, owned exclusively by that session.
//! The connection is handed out as a sink/stream pair so the relay can
//! send and receive concurrently.

use async_trait::async_trait;

/// Errors surfaced by the duplex transport
#[derive(Debug, thiserror::Error)]
pub enum DuplexError {
    /// The connection attempt failed.
    #[error("duplex connect failed: {0}")]
    Connect(String),

    /// A send on an established connection failed.
    #[error("duplex send failed: {0}")]
    Send(String),
}

/// Event emitted by the remote half of a duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplexEvent {
    /// A payload from the remote peer
    Message(Vec<u8>),
    /// The remote peer closed the connection
    Closed,
    /// The connection failed
    Error(String),
}

/// Sending half of a duplex connection
#[async_trait]
pub trait DuplexSink: Send {
    /// Send a payload to the remote peer
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), DuplexError>;

    /// Close the connection; idempotent
    async fn close(&mut self);
}

/// Receiving half of a duplex connection
#[async_trait]
pub trait DuplexStream: Send {
    /// Next event from the remote peer
    ///
    /// After `Closed` or `Error` the stream yields nothing further of
    /// interest; callers stop polling on either.
    async fn next_event(&mut self) -> DuplexEvent;
}

/// Factory for duplex connections, one per admitted session
#[async_trait]
pub trait DuplexConnector: Send + Sync {
    /// Open a connection to the configured target
    #[allow(clippy::type_complexity)]
    async fn connect(&self) -> Result<(Box<dyn DuplexSink>, Box<dyn DuplexStream>), DuplexError>;
}
