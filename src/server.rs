//! Core MCP server implementation

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::client::{AthenaClient, HealthState};
use crate::prompts::{PromptError, get_prompt, prompt_definitions};
use crate::resources::{ResourceError, read_resource, resource_catalogue};
use crate::tools::{ToolError, call_tool, tool_definitions};
use crate::transport::{McpMessage, MessageHandler, error_codes};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "athenahealth-mcp-server";

/// Main MCP server exposing the athenahealth tools, resources and prompts
#[derive(Clone)]
pub struct AthenaMcpServer {
    client: AthenaClient,
}

impl AthenaMcpServer {
    /// Create a new MCP server instance
    pub fn new(client: AthenaClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AthenaClient {
        &self.client
    }

    /// Check the upstream once; an unhealthy upstream is logged, not fatal
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        info!("Starting athenahealth MCP Server v{}", crate::VERSION);
        let health = self.client.health_check().await;
        match health.status {
            HealthState::Healthy => info!(tier = self.client.tier().as_str(), "athenahealth API reachable"),
            HealthState::Unhealthy => warn!("athenahealth API health check failed; serving anyway"),
        }
        Ok(())
    }

    /// Get MCP initialize result
    pub fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": crate::VERSION,
            },
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
                "prompts": { "listChanged": false },
            },
            "instructions": "athenahealth practice-management tools: patient search and registration, \
                 clinical summaries, prescriptions, scheduling and encounters.",
        })
    }
}

fn to_result<T: Serialize>(id: Value, value: &T) -> McpMessage {
    match serde_json::to_value(value) {
        Ok(result) => McpMessage::response(id, result),
        Err(e) => McpMessage::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
    }
}

fn tool_error(id: Value, err: ToolError) -> McpMessage {
    let code = match err {
        ToolError::UnknownTool(_) => error_codes::METHOD_NOT_FOUND,
        ToolError::InvalidArguments { .. } => error_codes::INVALID_PARAMS,
    };
    McpMessage::error(id, code, err.to_string())
}

fn resource_error(id: Value, err: ResourceError) -> McpMessage {
    let code = match err {
        ResourceError::InvalidUri(_) => error_codes::INVALID_PARAMS,
        ResourceError::Upstream { .. } => error_codes::INTERNAL_ERROR,
    };
    McpMessage::error(id, code, err.to_string())
}

fn prompt_error(id: Value, err: PromptError) -> McpMessage {
    let code = match err {
        PromptError::UnknownPrompt(_) => error_codes::METHOD_NOT_FOUND,
        PromptError::InvalidArguments { .. } => error_codes::INVALID_PARAMS,
    };
    McpMessage::error(id, code, err.to_string())
}

/// Implementation of MessageHandler for AthenaMcpServer
#[async_trait]
impl MessageHandler for AthenaMcpServer {
    async fn handle_message(&self, message: McpMessage) -> Result<Option<McpMessage>> {
        let reply = match message {
            McpMessage::Initialize { id, params } => {
                let client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown");
                info!("Received initialize request from client: {}", client);
                McpMessage::response(id, self.initialize_result())
            }
            McpMessage::Ping { id } => McpMessage::response(id, json!({})),
            McpMessage::ToolsList { id } => to_result(id, &json!({ "tools": tool_definitions() })),
            McpMessage::ToolsCall { id, params } => {
                let arguments = params.arguments.unwrap_or(Value::Null);
                match call_tool(&self.client, &params.name, arguments).await {
                    Ok(output) => to_result(id, &output),
                    Err(err) => tool_error(id, err),
                }
            }
            McpMessage::ResourcesList { id } => to_result(id, &json!({ "resources": resource_catalogue() })),
            McpMessage::ResourcesRead { id, params } => match read_resource(&self.client, &params.uri).await {
                Ok(result) => to_result(id, &result),
                Err(err) => {
                    warn!("Resource read failed: {}", err);
                    resource_error(id, err)
                }
            },
            McpMessage::PromptsList { id } => to_result(id, &json!({ "prompts": prompt_definitions() })),
            McpMessage::PromptsGet { id, params } => {
                let arguments = params.arguments.unwrap_or(Value::Null);
                match get_prompt(&self.client, &params.name, arguments).await {
                    Ok(result) => to_result(id, &result),
                    Err(err) => prompt_error(id, err),
                }
            }
            McpMessage::Unsupported { id, method } => {
                McpMessage::error(id, error_codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
            }
            McpMessage::Notification { method, .. } => {
                info!("Received notification: {}", method);
                return Ok(None);
            }
            McpMessage::Response { .. } => {
                // This server doesn't initiate requests, so we shouldn't receive responses
                warn!("Received unexpected response message");
                return Ok(None);
            }
        };

        Ok(Some(reply))
    }
}
