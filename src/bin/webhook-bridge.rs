//! athenahealth webhook bridge - plain HTTP front end for workflow tools

use std::sync::Arc;

use anyhow::{Context, Result};
use athenahealth_mcp::bridge::{self, DEFAULT_PORT, SERVICE_NAME};
use athenahealth_mcp::logging::{self, LogConfig, LogTarget};
use athenahealth_mcp::{AthenaClient, AthenaConfig, AuditLogger};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "athenahealth-webhook-bridge")]
#[command(about = "HTTP bridge exposing athenahealth operations to workflow tools")]
#[command(version)]
struct Cli {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let athena = AthenaConfig::from_env();
    let level = athena.as_ref().map(|c| c.log_level).unwrap_or_default();
    let log_dir = athena.as_ref().ok().and_then(|c| c.log_dir.clone());
    let _guard =
        logging::init(&LogConfig { level, target: LogTarget::Stdout, log_dir: log_dir.clone(), ..LogConfig::default() })?;

    let athena = athena.context("invalid athenahealth configuration")?;
    let audit = AuditLogger::from_log_dir(log_dir.as_deref()).context("failed to open audit log")?;
    let client = AthenaClient::new(&athena, Arc::new(audit))?;

    let health = client.health_check().await;
    if health.status != athenahealth_mcp::client::HealthState::Healthy {
        warn!("athenahealth API health check failed; serving anyway");
    }

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("Failed to bind {SERVICE_NAME} to {addr}"))?;
    info!(tier = client.tier().as_str(), "{SERVICE_NAME} listening on http://{addr}");

    axum::serve(listener, bridge::router(client))
        .with_graceful_shutdown(async {
            match signal::ctrl_c().await {
                Ok(_) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        })
        .await
        .context("webhook bridge server error")?;

    Ok(())
}
