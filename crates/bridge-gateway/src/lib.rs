//! # bridge-gateway
//!
//! The bridge between CoAP observe exchanges and per-session WebSocket
//! connections: exchange classification, relay state machine, transport
//! adapters, and the standalone CoAP→HTTP forwarding proxy.

pub mod protocol;
pub mod proxy;
pub mod relay;
pub mod server;
pub mod transport;


pub use server::{create_bridge, run, BridgeServer, ExchangeOutcome};
