//! TickerDeck Gateway Binary
//!
//! Serves prices, favorites and simulated trades over HTTP.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickerdeck_gateway::{ApiServer, Gateway, GatewayConfig, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    init_tracing(&config);

    info!("Starting TickerDeck gateway");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let gateway = Arc::new(Gateway::new(config.clone())?);

    // Set up graceful shutdown
    let gateway_clone = gateway.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Shutdown signal received");
        if let Err(e) = gateway_clone.stop().await {
            error!(error = %e, "Error during shutdown");
        }
    });

    gateway.start().await?;

    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        currency = %config.local_currency,
        "Gateway running"
    );

    ApiServer::new(gateway.state().clone())
        .run_with_shutdown(gateway.shutdown_signal())
        .await?;

    // Covers a server that exited on its own.
    gateway.stop().await?;

    info!("Gateway shutdown complete");
    Ok(())
}

fn init_tracing(config: &GatewayConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}
