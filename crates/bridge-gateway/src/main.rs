//! CoAP↔WebSocket bridge entry point
//!
//! Run with:
//! ```bash
//! cargo run --bin coap-ws-bridge
//! ```
//!
//! Configuration is loaded from environment variables.

use bridge_common::{try_init_tracing, BridgeConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    // Run the bridge
    if let Err(e) = run().await {
        error!(error = %e, "Bridge failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting CoAP-WebSocket bridge...");

    // Load configuration
    let config = BridgeConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        env = ?config.app.env,
        addr = %config.coap.address(),
        target = %config.target.url,
        max_sessions = config.sessions.max_sessions,
        "Configuration loaded"
    );

    // Run the bridge server
    bridge_gateway::run(config).await?;

    Ok(())
}
