//! # bridge-core
//!
//! Domain layer for the CoAP/WebSocket session bridge: session identity,
//! the live-session registry, admission control, and the collaborator
//! traits implemented by the transport adapters. This crate performs no
//! network I/O.

pub mod error;
pub mod session;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::BridgeError;
pub use session::{
    AdmissionController, RandomIdGenerator, SessionIdGenerator, SessionRegistry, SessionState,
    SessionToken,
};
pub use traits::{
    DuplexConnector, DuplexError, DuplexEvent, DuplexSink, DuplexStream, ExchangeError,
    ExchangeResponder, InboundExchange,
};
