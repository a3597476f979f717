//! Transport adapters
//!
//! Concrete implementations of the collaborator contracts: a CoAP/UDP
//! listener for the request/response side and a WebSocket connector for
//! the duplex side.

mod coap;
mod ws;

pub use coap::CoapListener;
pub use ws::WsConnector;
