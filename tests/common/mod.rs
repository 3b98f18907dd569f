//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use athenahealth_mcp::audit::{AuditLogger, MemorySink};
use athenahealth_mcp::{AthenaClient, AthenaConfig};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRACTICE_ID: &str = "195900";
pub const TOKEN_PATH: &str = "/oauth2/v1/token";

/// Config targeting `base` for both the API and the token endpoint
pub fn config(base: &str, tier: Option<&str>) -> AthenaConfig {
    let base = base.to_string();
    let token_url = format!("{base}{TOKEN_PATH}");
    let tier = tier.map(str::to_string);
    AthenaConfig::from_lookup(move |key| match key {
        "ATHENA_CLIENT_ID" => Some("client".to_string()),
        "ATHENA_CLIENT_SECRET" => Some("secret".to_string()),
        "ATHENA_PRACTICE_ID" => Some(PRACTICE_ID.to_string()),
        "ATHENA_BASE_URL" => Some(base.clone()),
        "ATHENA_TOKEN_URL" => Some(token_url.clone()),
        "ATHENA_API_TIER" => tier.clone(),
        _ => None,
    })
    .expect("test config")
}

pub fn api_path(rest: &str) -> String {
    format!("/v1/{PRACTICE_ID}/{rest}")
}

pub async fn mount_token(server: &MockServer, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": expires_in,
        })))
        .mount(server)
        .await;
}

/// Client against a mock upstream with a recording audit sink
pub async fn client(server: &MockServer, tier: Option<&str>) -> (AthenaClient, MemorySink) {
    mount_token(server, 3600).await;
    let sink = MemorySink::new();
    let audit = AuditLogger::new(sink.clone());
    let client = AthenaClient::new(&config(&server.uri(), tier), Arc::new(audit)).expect("client");
    (client, sink)
}

/// Requests the upstream received, excluding token exchanges
pub async fn api_requests(server: &MockServer) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() != TOKEN_PATH)
        .collect()
}

pub fn token_requests(requests: &[wiremock::Request]) -> usize {
    requests.iter().filter(|r| r.url.path() == TOKEN_PATH).count()
}

pub fn events(sink: &MemorySink) -> Vec<String> {
    sink.entries().iter().filter_map(|e| e["event"].as_str().map(str::to_string)).collect()
}

pub fn tool_text(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("tool text is JSON")
}
