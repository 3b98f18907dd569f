//! HTTP transport implementation

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Notify};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::{McpMessage, MessageHandler, process_raw};

/// HTTP transport for web applications and remote access
#[derive(Clone)]
pub struct HttpTransport {
    port: u16,
    host: String,
    cors_origins: Vec<String>,
    shutdown: Arc<Notify>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn MessageHandler + Send + Sync>,
}

impl HttpTransport {
    /// Create a new HTTP transport instance
    pub fn new(port: u16) -> Self {
        Self::with_config(port, "0.0.0.0".to_string(), vec!["*".to_string()])
    }

    /// Create a new HTTP transport with custom configuration
    pub fn with_config(port: u16, host: String, cors_origins: Vec<String>) -> Self {
        Self { port, host, cors_origins, shutdown: Arc::new(Notify::new()) }
    }

    fn cors(&self) -> CorsLayer {
        let mut cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);

        if self.cors_origins.iter().any(|o| o == "*") {
            return cors.allow_origin(Any);
        }
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        cors = cors.allow_origin(origins);
        cors
    }

    /// Create the Axum router with all routes and middleware
    pub fn router(&self, handler: Arc<dyn MessageHandler + Send + Sync>) -> Router {
        Router::new()
            .route("/mcp", post(handle_rpc))
            .route("/health", get(handle_health_check))
            .layer(TraceLayer::new_for_http())
            .layer(self.cors())
            .with_state(AppState { handler })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(3000)
    }
}

#[async_trait]
impl super::Transport for HttpTransport {
    /// Start the HTTP transport server
    async fn start(&self, handler: Box<dyn MessageHandler + Send + Sync>) -> Result<()> {
        let app = self.router(Arc::from(handler));
        let addr = format!("{}:{}", self.host, self.port);

        let listener =
            TcpListener::bind(&addr).await.with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        info!("HTTP server listening on http://{}", addr);

        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
            .context("HTTP server error")?;

        Ok(())
    }

    /// Shutdown the HTTP transport
    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down HTTP transport");
        self.shutdown.notify_one();
        Ok(())
    }

    /// Requests are answered inline; there is no push channel
    async fn send_message(&self, message: McpMessage) -> Result<()> {
        debug!("Dropping server-initiated message on HTTP transport: {:?}", message.id());
        Ok(())
    }
}

/// Handle one JSON-RPC message posted to `/mcp`
async fn handle_rpc(State(state): State<AppState>, body: String) -> Response {
    match process_raw(state.handler.as_ref(), &body).await {
        Some(reply) => (StatusCode::OK, Json(reply)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", version: crate::VERSION, timestamp: chrono::Utc::now() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct Pong;

    #[async_trait]
    impl MessageHandler for Pong {
        async fn handle_message(&self, message: McpMessage) -> Result<Option<McpMessage>> {
            Ok(message.id().cloned().map(|id| McpMessage::response(id, json!({}))))
        }
    }

    fn app() -> Router {
        HttpTransport::default().router(Arc::new(Pong))
    }

    async fn post_rpc(body: &str) -> (StatusCode, Value) {
        let request = Request::post("/mcp").body(Body::from(body.to_string())).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_rpc_round_trip() {
        let (status, body) = post_rpc(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"jsonrpc": "2.0", "id": 3, "result": {}}));
    }

    #[tokio::test]
    async fn test_notification_is_accepted_without_body() {
        let (status, body) = post_rpc(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_parse_error_is_json_rpc_error() {
        let (status, body) = post_rpc("{").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], crate::VERSION);
    }
}
