//! Transport layer implementations for MCP protocol
//!
//! Supports two transport methods sharing one JSON-RPC 2.0 codec:
//! - stdio: line-delimited messages for local MCP clients
//! - http: `POST /mcp` for remote access

pub mod http;
pub mod stdio;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

pub use http::HttpTransport;
pub use stdio::StdioTransport;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// JSON-RPC 2.0 message on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP message types (internal representation)
#[derive(Debug, Clone)]
pub enum McpMessage {
    Initialize { id: Value, params: InitializeParams },
    Ping { id: Value },
    ToolsList { id: Value },
    ToolsCall { id: Value, params: ToolsCallParams },
    ResourcesList { id: Value },
    ResourcesRead { id: Value, params: ResourcesReadParams },
    PromptsList { id: Value },
    PromptsGet { id: Value, params: PromptsGetParams },
    /// A request for a method this server does not implement
    Unsupported { id: Value, method: String },
    Notification { method: String, params: Option<Value> },
    Response { id: Value, result: Option<Value>, error: Option<McpError> },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Tool call parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesReadParams {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsGetParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// MCP error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

/// A message that could not be decoded, with the id to answer it under
#[derive(Debug, Clone, Error)]
#[error("{}", .error.message)]
pub struct ProtocolError {
    pub id: Value,
    pub error: McpError,
}

impl ProtocolError {
    pub fn new(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self { id, error: McpError::new(code, message) }
    }

    pub fn into_response(self) -> McpMessage {
        McpMessage::Response { id: self.id, result: None, error: Some(self.error) }
    }
}

fn params<T: serde::de::DeserializeOwned>(id: &Value, method: &str, params: Option<Value>) -> Result<T, ProtocolError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params).map_err(|e| {
        ProtocolError::new(id.clone(), error_codes::INVALID_PARAMS, format!("Invalid params for {method}: {e}"))
    })
}

impl McpMessage {
    pub fn response(id: Value, result: Value) -> Self {
        Self::Response { id, result: Some(result), error: None }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self::Response { id, result: None, error: Some(McpError::new(code, message)) }
    }

    /// Request id, for messages that expect a reply
    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Initialize { id, .. }
            | Self::Ping { id }
            | Self::ToolsList { id }
            | Self::ToolsCall { id, .. }
            | Self::ResourcesList { id }
            | Self::ResourcesRead { id, .. }
            | Self::PromptsList { id }
            | Self::PromptsGet { id, .. }
            | Self::Unsupported { id, .. } => Some(id),
            Self::Notification { .. } | Self::Response { .. } => None,
        }
    }

    /// Convert MCP message to JSON-RPC message for serialization
    pub fn to_jsonrpc(&self) -> JsonRpcMessage {
        let request = |id: &Value, method: &str, params: Option<Value>| JsonRpcMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.clone()),
            method: Some(method.to_string()),
            params,
            ..Default::default()
        };

        match self {
            Self::Initialize { id, params } => request(id, "initialize", serde_json::to_value(params).ok()),
            Self::Ping { id } => request(id, "ping", None),
            Self::ToolsList { id } => request(id, "tools/list", None),
            Self::ToolsCall { id, params } => request(id, "tools/call", serde_json::to_value(params).ok()),
            Self::ResourcesList { id } => request(id, "resources/list", None),
            Self::ResourcesRead { id, params } => request(id, "resources/read", serde_json::to_value(params).ok()),
            Self::PromptsList { id } => request(id, "prompts/list", None),
            Self::PromptsGet { id, params } => request(id, "prompts/get", serde_json::to_value(params).ok()),
            Self::Unsupported { id, method } => request(id, method, None),
            Self::Notification { method, params } => JsonRpcMessage {
                jsonrpc: JSONRPC_VERSION.to_string(),
                method: Some(method.clone()),
                params: params.clone(),
                ..Default::default()
            },
            Self::Response { id, result, error } => JsonRpcMessage {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: Some(id.clone()),
                result: result.clone(),
                error: error.clone(),
                ..Default::default()
            },
        }
    }

    /// Convert JSON-RPC message to MCP message
    pub fn from_jsonrpc(message: JsonRpcMessage) -> Result<Self, ProtocolError> {
        let JsonRpcMessage { jsonrpc, id, method, params: raw, result, error } = message;
        let reply_id = id.clone().unwrap_or(Value::Null);

        if jsonrpc != JSONRPC_VERSION {
            return Err(ProtocolError::new(reply_id, error_codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""));
        }

        let (method, id) = match (method, id) {
            (Some(method), None) => return Ok(Self::Notification { method, params: raw }),
            (Some(method), Some(id)) => (method, id),
            (None, Some(id)) if result.is_some() || error.is_some() => {
                return Ok(Self::Response { id, result, error });
            }
            _ => {
                return Err(ProtocolError::new(reply_id, error_codes::INVALID_REQUEST, "Missing method"));
            }
        };

        Ok(match method.as_str() {
            "initialize" => Self::Initialize { params: params(&id, &method, raw)?, id },
            "ping" => Self::Ping { id },
            "tools/list" => Self::ToolsList { id },
            "tools/call" => Self::ToolsCall { params: params(&id, &method, raw)?, id },
            "resources/list" => Self::ResourcesList { id },
            "resources/read" => Self::ResourcesRead { params: params(&id, &method, raw)?, id },
            "prompts/list" => Self::PromptsList { id },
            "prompts/get" => Self::PromptsGet { params: params(&id, &method, raw)?, id },
            _ => Self::Unsupported { id, method },
        })
    }
}

/// Decode one raw JSON-RPC message
pub fn decode(raw: &str) -> Result<McpMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ProtocolError::new(Value::Null, error_codes::PARSE_ERROR, format!("Parse error: {e}")))?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let message: JsonRpcMessage = serde_json::from_value(value)
        .map_err(|e| ProtocolError::new(id, error_codes::INVALID_REQUEST, format!("Invalid request: {e}")))?;
    McpMessage::from_jsonrpc(message)
}

/// Decode, handle and encode one message; `None` means nothing to send back
pub async fn process_raw(handler: &(dyn MessageHandler + Send + Sync), raw: &str) -> Option<JsonRpcMessage> {
    let message = match decode(raw) {
        Ok(message) => message,
        Err(err) => {
            debug!(code = err.error.code, "rejecting message: {err}");
            return Some(err.into_response().to_jsonrpc());
        }
    };

    let id = message.id().cloned();
    match handler.handle_message(message).await {
        Ok(reply) => reply.map(|m| m.to_jsonrpc()),
        Err(e) => {
            error!("Handler error: {e:#}");
            id.map(|id| McpMessage::error(id, error_codes::INTERNAL_ERROR, e.to_string()).to_jsonrpc())
        }
    }
}

/// Message handler trait for processing incoming MCP messages
#[async_trait]
pub trait MessageHandler {
    /// Handle an incoming MCP message
    async fn handle_message(&self, message: McpMessage) -> Result<Option<McpMessage>>;
}

/// Trait for all transport implementations
#[async_trait]
pub trait Transport {
    /// Start the transport and begin handling connections
    async fn start(&self, handler: Box<dyn MessageHandler + Send + Sync>) -> Result<()>;

    /// Stop the transport gracefully
    async fn shutdown(&self) -> Result<()>;

    /// Send a message through the transport
    async fn send_message(&self, message: McpMessage) -> Result<()>;
}
