//! Standard I/O transport implementation

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
    sync::{Mutex, Notify},
    task::{JoinError, JoinSet},
};
use tracing::{debug, info, warn};

use super::{JsonRpcMessage, McpMessage, MessageHandler, process_raw};

/// Standard I/O transport for local CLI integration with MCP clients
///
/// Only protocol messages are written to stdout; diagnostics must go to
/// stderr (see [`crate::logging::LogTarget`]).
pub struct StdioTransport {
    writer: Arc<Mutex<BufWriter<tokio::io::Stdout>>>,
    shutdown: Arc<Notify>,
}

impl StdioTransport {
    /// Create a new stdio transport instance
    pub fn new() -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(tokio::io::stdout()))),
            shutdown: Arc::new(Notify::new()),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_line<W>(writer: &Mutex<W>, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message).context("Failed to serialize message to JSON")?;
    let mut writer = writer.lock().await;
    writer.write_all(json.as_bytes()).await.context("Failed to write message")?;
    writer.write_all(b"\n").await.context("Failed to write newline")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

fn finish(done: Result<Result<()>, JoinError>) -> Result<()> {
    done.context("Request task failed")?
}

/// Serve line-delimited JSON-RPC until EOF or shutdown
///
/// Each request runs on its own task, so replies are written in completion
/// order and a slow upstream call does not hold up the rest of the session.
/// Requests still in flight at EOF or shutdown are answered before returning.
pub async fn run_session<R, W>(
    reader: R,
    writer: Arc<Mutex<W>>,
    handler: Arc<dyn MessageHandler + Send + Sync>,
    shutdown: &Notify,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = reader.lines();
    let mut in_flight: JoinSet<Result<()>> = JoinSet::new();

    loop {
        let line = tokio::select! {
            _ = shutdown.notified() => {
                info!("Shutdown requested, stopping message processing");
                break;
            }
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                finish(done)?;
                continue;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("EOF received on stdin");
                break;
            }
            Err(e) => {
                warn!("Failed to read from input: {e}");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let raw = trimmed.to_string();
        let handler = Arc::clone(&handler);
        let writer = Arc::clone(&writer);
        in_flight.spawn(async move {
            if let Some(reply) = process_raw(handler.as_ref(), &raw).await {
                write_line(&*writer, &reply).await?;
            }
            Ok(())
        });
    }

    while let Some(done) = in_flight.join_next().await {
        finish(done)?;
    }

    info!("Message processing loop ended");
    Ok(())
}

#[async_trait]
impl super::Transport for StdioTransport {
    /// Start the stdio transport and begin message processing
    async fn start(&self, handler: Box<dyn MessageHandler + Send + Sync>) -> Result<()> {
        info!("Starting stdio transport for MCP communication");
        let reader = BufReader::new(tokio::io::stdin());
        run_session(reader, Arc::clone(&self.writer), Arc::from(handler), &self.shutdown).await
    }

    /// Shutdown the stdio transport
    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down stdio transport");
        self.shutdown.notify_one();
        Ok(())
    }

    /// Send a message through the stdio transport
    async fn send_message(&self, message: McpMessage) -> Result<()> {
        write_line(&*self.writer, &message.to_jsonrpc()).await
    }
}
