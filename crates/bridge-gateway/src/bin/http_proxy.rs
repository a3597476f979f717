//! CoAP→HTTP forwarding proxy entry point
//!
//! Run with:
//! ```bash
//! cargo run --bin coap-http-proxy
//! ```
//!
//! Configuration is loaded from environment variables.

use bridge_common::{try_init_tracing, HttpProxyConfig};
use bridge_gateway::proxy::HttpProxy;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Proxy failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting CoAP-HTTP forwarding proxy...");

    let config = HttpProxyConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    let proxy = HttpProxy::bind(&config.coap.address(), config.target_url.clone()).await?;
    info!(
        addr = %config.coap.address(),
        target = %config.target_url,
        "CoAP proxy listening"
    );

    proxy.run().await?;

    Ok(())
}
