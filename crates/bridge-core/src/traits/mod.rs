//! Collaborator contracts (ports) - transport interfaces the bridge
//! depends on
//!
//! The domain layer defines what it needs from the request/response and
//! duplex transports; the transport adapters provide the implementation.

mod duplex;
mod exchange;

pub use duplex::{DuplexConnector, DuplexError, DuplexEvent, DuplexSink, DuplexStream};
pub use exchange::{ExchangeError, ExchangeResponder, InboundExchange};
