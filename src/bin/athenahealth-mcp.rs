//! athenahealth MCP Server - Main binary

use std::sync::Arc;

use anyhow::{Context, Result};
use athenahealth_mcp::config::LogLevel;
use athenahealth_mcp::logging::{self, LogConfig, LogTarget};
use athenahealth_mcp::transport::{Transport, http::HttpTransport, stdio::StdioTransport};
use athenahealth_mcp::{AthenaClient, AthenaConfig, AthenaMcpServer, AuditLogger, ServerConfig};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "athenahealth-mcp")]
#[command(about = "athenahealth Model Context Protocol Server")]
#[command(version)]
struct Cli {
    /// Host to bind to for HTTP transport
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to bind to for HTTP transport
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Log level (error, warn, info, debug); overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Transport mode: stdio, http, or both
    #[arg(long, default_value = "stdio", value_parser = ["stdio", "http", "both"])]
    transport: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let athena = AthenaConfig::from_env();
    let level = cli.log_level.or_else(|| athena.as_ref().ok().map(|c| c.log_level)).unwrap_or_default();
    let log_dir = athena.as_ref().ok().and_then(|c| c.log_dir.clone());

    // stdio owns stdout for protocol traffic
    let target = if cli.transport == "http" { LogTarget::Stdout } else { LogTarget::Stderr };
    let _guard = logging::init(&LogConfig { level, target, log_dir: log_dir.clone(), ..LogConfig::default() })?;

    let athena = athena.context("invalid athenahealth configuration")?;
    let config = ServerConfig {
        host: cli.host.clone(),
        port: cli.port,
        log_level: level.to_string(),
        http_transport: cli.transport == "http" || cli.transport == "both",
        stdio_transport: cli.transport == "stdio" || cli.transport == "both",
    };

    let audit = AuditLogger::from_log_dir(log_dir.as_deref()).context("failed to open audit log")?;
    let client = AthenaClient::new(&athena, Arc::new(audit))?;
    let server = AthenaMcpServer::new(client);
    server.start().await?;

    let shutdown_signal = async {
        match signal::ctrl_c().await {
            Ok(_) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    };

    match (config.stdio_transport, config.http_transport) {
        (true, false) => {
            info!("Starting stdio transport for MCP client integration");
            let transport = StdioTransport::new();

            tokio::select! {
                result = transport.start(Box::new(server.clone())) => {
                    match result {
                        Ok(_) => info!("Stdio transport completed successfully"),
                        Err(e) => error!("Stdio transport error: {}", e),
                    }
                }
                _ = shutdown_signal => {
                    if let Err(e) = transport.shutdown().await {
                        error!("Error during stdio transport shutdown: {}", e);
                    }
                }
            }
        }
        (false, true) => {
            info!("Starting HTTP transport on {}:{}", config.host, config.port);
            let transport = HttpTransport::with_config(config.port, config.host.clone(), vec!["*".to_string()]);

            tokio::select! {
                result = transport.start(Box::new(server.clone())) => {
                    if let Err(e) = result {
                        error!("HTTP transport error: {}", e);
                        return Err(e);
                    }
                }
                _ = shutdown_signal => {
                    if let Err(e) = transport.shutdown().await {
                        error!("Error during HTTP transport shutdown: {}", e);
                    }
                }
            }
        }
        _ => {
            info!("Starting both stdio and HTTP transports");
            let stdio_transport = StdioTransport::new();
            let http_transport =
                HttpTransport::with_config(config.port, config.host.clone(), vec!["*".to_string()]);

            let stdio_server = server.clone();
            let stdio_task = tokio::spawn(async move {
                if let Err(e) = stdio_transport.start(Box::new(stdio_server)).await {
                    error!("Stdio transport error: {}", e);
                }
            });
            let http_task = tokio::spawn(async move {
                if let Err(e) = http_transport.start(Box::new(server)).await {
                    error!("HTTP transport error: {}", e);
                }
            });

            tokio::select! {
                _ = stdio_task => info!("Stdio transport task completed"),
                _ = http_task => info!("HTTP transport task completed"),
                _ = shutdown_signal => info!("Shutdown signal received, stopping all transports"),
            }
        }
    }

    info!("athenahealth MCP Server shutdown complete");
    Ok(())
}
