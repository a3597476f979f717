//! Bridge server setup
//!
//! Wires configuration, transports, and the bridge together and runs the
//! CoAP listener.

mod bridge;

pub use bridge::{BridgeServer, ExchangeOutcome};

use crate::transport::{CoapListener, WsConnector};
use bridge_common::{AppError, BridgeConfig};
use bridge_core::{AdmissionController, RandomIdGenerator};
use std::sync::Arc;
use std::time::Duration;

/// Build a bridge server from configuration
pub fn create_bridge(config: &BridgeConfig) -> Result<Arc<BridgeServer>, AppError> {
    let connector = Arc::new(WsConnector::new(config.target.url.clone()));
    let admission = AdmissionController::new(config.sessions.max_sessions)
        .map_err(|e| AppError::Config(e.to_string()))?;

    Ok(Arc::new(BridgeServer::new(
        connector,
        admission,
        Arc::new(RandomIdGenerator),
        Duration::from_millis(config.sessions.establish_timeout_ms),
    )))
}

/// Run the complete bridge with configuration
pub async fn run(config: BridgeConfig) -> Result<(), AppError> {
    let bridge = create_bridge(&config)?;

    let listener = CoapListener::bind(&config.coap.address(), bridge).await?;
    tracing::info!(
        addr = %config.coap.address(),
        target = %config.target.url,
        max_sessions = config.sessions.max_sessions,
        "CoAP bridge listening"
    );

    listener.run().await
}
