//! `stepvault gateway`: Start the HTTP/SSE server.

use anyhow::Context;
use stepvault_config::AppConfig;
use tracing::info;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("StepVault Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Checkpoints: {:?}", config.checkpoint.backend);

    info!(
        host = %config.gateway.host,
        port = config.gateway.port,
        provider = %config.default_provider,
        "Starting gateway"
    );

    stepvault_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("gateway failed: {e}"))
}
