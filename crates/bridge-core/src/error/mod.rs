//! Error types for the bridge domain

mod bridge_error;

pub use bridge_error::BridgeError;
