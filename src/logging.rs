//! Diagnostic logging setup
//!
//! The binaries call [`init`] once with an explicit [`LogConfig`]. The stdio
//! MCP transport owns stdout, so its config targets stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogLevel;

/// Where console diagnostics go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Stdout,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub target: LogTarget,
    /// Daily-rolled `athenahealth-mcp.log` files are written here when set
    pub log_dir: Option<PathBuf>,
    pub max_log_files: usize,
    /// Include file and line information in console output
    pub verbose: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            target: LogTarget::Stderr,
            log_dir: None,
            max_log_files: 10,
            verbose: false,
        }
    }
}

impl LogConfig {
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{},tower_http=info", self.level.as_str()))
        })
    }
}

/// Keeps the non-blocking file writer alive; drop it at shutdown to flush
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init(config: &LogConfig) -> Result<LogGuard> {
    let console = fmt::layer()
        .with_target(false)
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .with_ansi(false);
    let console = match config.target {
        LogTarget::Stderr => console.with_writer(std::io::stderr).boxed(),
        LogTarget::Stdout => console.with_writer(std::io::stdout).boxed(),
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("athenahealth-mcp")
                .filename_suffix("log")
                .max_log_files(config.max_log_files.max(1))
                .build(dir)
                .context("failed to initialize rolling log file")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}
