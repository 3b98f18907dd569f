//! Authenticated request pipeline shared by every domain service

use std::sync::Arc;

use reqwest::{Method, StatusCode, Url, header};
use serde_json::Value;
use tracing::{debug, warn};

use super::fields::UpstreamFields;
use super::token::TokenManager;
use crate::VERSION;
use crate::audit::AuditLogger;
use crate::config::{ApiTier, AthenaConfig};
use crate::error::{AthenaError, NormalizedError};

pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: Url,
    version: String,
    practice_id: String,
    tier: ApiTier,
    tokens: TokenManager,
    audit: Arc<AuditLogger>,
}

impl RequestExecutor {
    pub fn new(config: &AthenaConfig, audit: Arc<AuditLogger>) -> Result<Self, AthenaError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("athenahealth-mcp/{VERSION}"))
            .build()
            .map_err(|e| AthenaError::Configuration(format!("failed to build HTTP client: {e}")))?;

        if config.base_url.cannot_be_a_base() {
            return Err(AthenaError::Configuration(format!(
                "ATHENA_BASE_URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        Ok(Self {
            tokens: TokenManager::new(http.clone(), config, audit.clone()),
            http,
            base_url: config.base_url.clone(),
            version: config.version.clone(),
            practice_id: config.practice_id.clone(),
            tier: config.tier(),
            audit,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn tier(&self) -> ApiTier {
        self.tier
    }

    pub fn practice_id(&self) -> &str {
        &self.practice_id
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// `{base}/{version}/{practice}/{segments...}`, each segment percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, AthenaError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AthenaError::Configuration("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(&self.version)
            .push(&self.practice_id)
            .extend(segments);
        Ok(url)
    }

    pub async fn get(&self, segments: &[&str], query: &UpstreamFields) -> Result<Value, AthenaError> {
        self.execute(Method::GET, segments, query).await
    }

    pub async fn post_form(&self, segments: &[&str], form: &UpstreamFields) -> Result<Value, AthenaError> {
        self.execute(Method::POST, segments, form).await
    }

    pub async fn put_form(&self, segments: &[&str], form: &UpstreamFields) -> Result<Value, AthenaError> {
        self.execute(Method::PUT, segments, form).await
    }

    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        fields: &UpstreamFields,
    ) -> Result<Value, AthenaError> {
        let url = self.endpoint(segments)?;
        let token = self.tokens.ensure_valid_token().await?;

        let request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json");
        let request = if method == Method::GET {
            request.query(fields.as_pairs())
        } else {
            request.form(fields.as_pairs())
        };

        let masked = self.audit.redactor().mask_path(url.path());
        debug!(method = %method, path = %masked, "upstream request");
        self.audit.api_request(method.as_str(), url.path());

        let response = request.send().await.map_err(|e| {
            let normalized = NormalizedError::from_transport(e);
            warn!(method = %method, path = %masked, "upstream transport error: {}", normalized.message);
            AthenaError::Upstream(normalized)
        })?;

        let status = response.status();
        self.audit.api_response(method.as_str(), status.as_u16(), url.path());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AthenaError::Upstream(NormalizedError::from_transport(e)))?;
        let body = parse_body(&bytes);

        if status.is_success() {
            return Ok(body);
        }

        warn!(method = %method, path = %masked, status = status.as_u16(), "upstream error response");
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        Err(AthenaError::Upstream(NormalizedError::from_response(status.as_u16(), body)))
    }
}

/// Empty bodies become `null`; bodies that are not JSON are kept as text
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::client::test_support::{config_for, mount_token};
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(server: &MockServer) -> RequestExecutor {
        RequestExecutor::new(&config_for(&server.uri()), Arc::new(AuditLogger::disabled())).unwrap()
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b"  \n"), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_body(b"pong"), json!("pong"));
    }

    #[tokio::test]
    async fn test_endpoint_encodes_segments() {
        let server = MockServer::start().await;
        let executor = executor(&server);

        let url = executor.endpoint(&["patients", "12 34"]).unwrap();
        assert_eq!(url.path(), "/v1/195900/patients/12%2034");
    }

    #[tokio::test]
    async fn test_get_sends_bearer_and_query() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/departments"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("showalldepartments", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"departments": []})))
            .expect(1)
            .mount(&server)
            .await;

        let body = executor(&server)
            .get(&["departments"], &UpstreamFields::new().push("showalldepartments", true))
            .await
            .unwrap();
        assert_eq!(body, json!({"departments": []}));
    }

    #[tokio::test]
    async fn test_post_sends_form_body() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("POST"))
            .and(path("/v1/195900/clinicalalerts/7/acknowledge"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("acknowledgedby=dr.smith"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let body = executor(&server)
            .post_form(
                &["clinicalalerts", "7", "acknowledge"],
                &UpstreamFields::new().push("acknowledgedby", "dr.smith"),
            )
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_error_body_is_normalized() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/patients/9"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "Invalid patient",
                "detailcode": "BAD_ID",
            })))
            .mount(&server)
            .await;

        let err = executor(&server).get(&["patients", "9"], &UpstreamFields::new()).await.unwrap_err();
        match err {
            AthenaError::Upstream(e) => {
                assert_eq!(e.status, Some(400));
                assert_eq!(e.error, "Invalid patient");
                assert_eq!(e.detailcode.as_deref(), Some("BAD_ID"));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_token() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/providers"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "expired"})))
            .mount(&server)
            .await;

        let executor = executor(&server);
        let err = executor.get(&["providers"], &UpstreamFields::new()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(executor.tokens().snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_audit_records_path_without_payload() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"lastname": "Doe"}])))
            .mount(&server)
            .await;

        let sink = MemorySink::new();
        let executor =
            RequestExecutor::new(&config_for(&server.uri()), Arc::new(AuditLogger::new(sink.clone()))).unwrap();
        executor
            .get(&["patients"], &UpstreamFields::new().push("lastname", "Doe"))
            .await
            .unwrap();

        let lines = sink.lines().concat();
        assert!(lines.contains("API_REQUEST"));
        assert!(lines.contains("API_RESPONSE"));
        assert!(lines.contains("/v1/{id}/patients"));
        assert!(!lines.contains("Doe"));
    }

    /// Token endpoint on `server`, API requests sent to `base`
    fn split_config(server: &MockServer, base: &str, timeout_secs: &str) -> AthenaConfig {
        let token_url = format!("{}/oauth2/v1/token", server.uri());
        let base = base.to_string();
        let timeout_secs = timeout_secs.to_string();
        AthenaConfig::from_lookup(move |key| match key {
            "ATHENA_CLIENT_ID" => Some("client".to_string()),
            "ATHENA_CLIENT_SECRET" => Some("secret".to_string()),
            "ATHENA_PRACTICE_ID" => Some("195900".to_string()),
            "ATHENA_BASE_URL" => Some(base.clone()),
            "ATHENA_TOKEN_URL" => Some(token_url.clone()),
            "ATHENA_TIMEOUT_SECS" => Some(timeout_secs.clone()),
            _ => None,
        })
        .unwrap()
    }

    fn search_filters() -> UpstreamFields {
        UpstreamFields::new().push("lastname", "Doe").push("dob", "1990-01-01")
    }

    #[tokio::test]
    async fn test_connection_failure_hides_url_and_filters() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        let sink = MemorySink::new();
        let config = split_config(&server, "http://127.0.0.1:1", "5");
        let executor = RequestExecutor::new(&config, Arc::new(AuditLogger::new(sink.clone()))).unwrap();

        let err = executor.get(&["patients"], &search_filters()).await.unwrap_err();

        let AthenaError::Upstream(normalized) = err else { panic!("expected upstream error, got {err:?}") };
        assert_eq!(normalized.status, None);
        assert_eq!(normalized.error, "Unknown error");
        for leaked in ["Doe", "1990-01-01", "lastname", "127.0.0.1:1/", "195900"] {
            assert!(!normalized.message.contains(leaked), "{leaked} in {}", normalized.message);
        }
        assert!(!sink.lines().concat().contains("Doe"));
    }

    #[tokio::test]
    async fn test_timeout_is_normalized_without_status() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/patients"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
            .mount(&server)
            .await;
        let executor =
            RequestExecutor::new(&split_config(&server, &server.uri(), "1"), Arc::new(AuditLogger::disabled())).unwrap();

        let err = executor.get(&["patients"], &search_filters()).await.unwrap_err();

        assert_eq!(err.status(), None);
        let message = err.to_string();
        assert!(message.starts_with("Request timed out"), "{message}");
        assert!(!message.contains("Doe"));
        assert!(!message.contains("dob="));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_diagnostic_logs_mask_ids() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("athenahealth_mcp=debug"))
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("GET"))
            .and(path("/v1/195900/patients/887766"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Not found"})))
            .mount(&server)
            .await;

        let err = executor(&server)
            .get(&["patients", "887766"], &UpstreamFields::new().push("lastname", "Doe"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("upstream request"), "{output}");
        assert!(output.contains("upstream error response"), "{output}");
        assert!(output.contains("/v1/{id}/patients/{id}"), "{output}");
        for leaked in ["887766", "195900", "Doe"] {
            assert!(!output.contains(leaked), "{leaked} in {output}");
        }
    }
}
