//! # athenahealth MCP Server
//!
//! Model Context Protocol server and webhook bridge for the athenahealth
//! practice-management API: token lifecycle, request execution, domain
//! mappers and an audit trail with PHI redaction.

pub mod audit;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

// Re-export commonly used types
pub use audit::AuditLogger;
pub use client::AthenaClient;
pub use config::{AthenaConfig, ServerConfig};
pub use error::AthenaError;
pub use server::AthenaMcpServer;

/// Current version of the MCP server
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
