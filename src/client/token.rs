//! OAuth2 client-credentials token lifecycle
//!
//! Token state lives behind a single async mutex that stays locked for the
//! whole exchange. When several requests find the token stale at once, the
//! first performs the exchange and the rest reuse its result.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit::{AuditLogger, AuditOutcome};
use crate::config::AthenaConfig;
use crate::error::AthenaError;

pub const SCOPE: &str = "athena/service/Athenanet.MDP.*";

/// Tokens expiring within this window are renewed before use
pub const REFRESH_WINDOW_SECS: i64 = 5 * 60;

const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<i64>,
}

/// `expires_in` arrives as a number from some gateways and a string from others
fn seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Read-only view of token state, without the token values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSnapshot {
    pub fn is_empty(&self) -> bool {
        !self.has_access_token && !self.has_refresh_token && self.expires_at.is_none()
    }
}

enum Grant<'a> {
    ClientCredentials,
    Refresh(&'a str),
}

impl Grant<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Refresh(_) => "refresh_token",
        }
    }
}

pub struct TokenManager {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    refresh_window: Duration,
    state: Mutex<TokenState>,
    audit: Arc<AuditLogger>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, config: &AthenaConfig, audit: Arc<AuditLogger>) -> Self {
        Self {
            http,
            token_url: config.token_endpoint(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_window: Duration::seconds(REFRESH_WINDOW_SECS),
            state: Mutex::new(TokenState::default()),
            audit,
        }
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Return a token that stays valid for at least the refresh window
    pub async fn ensure_valid_token(&self) -> Result<String, AthenaError> {
        let mut state = self.state.lock().await;

        let fresh = state
            .expires_at
            .is_some_and(|expires_at| expires_at - Utc::now() >= self.refresh_window);
        if let (true, Some(token)) = (fresh, &state.access_token) {
            return Ok(token.clone());
        }

        if state.access_token.is_some() && state.expires_at.is_some() {
            debug!("access token inside refresh window");
            self.renew(&mut state).await?;
        } else {
            self.exchange(&mut state, Grant::ClientCredentials).await?;
        }

        state
            .access_token
            .clone()
            .ok_or_else(|| AthenaError::Authentication {
                message: "token endpoint returned no access token".to_string(),
                status: None,
            })
    }

    /// Force a client-credentials exchange
    pub async fn authenticate(&self) -> Result<(), AthenaError> {
        let mut state = self.state.lock().await;
        self.exchange(&mut state, Grant::ClientCredentials).await
    }

    /// Drop all token state; the next request re-authenticates
    pub async fn invalidate(&self) {
        self.state.lock().await.clear();
        info!("access token invalidated");
    }

    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.lock().await;
        TokenSnapshot {
            has_access_token: state.access_token.is_some(),
            has_refresh_token: state.refresh_token.is_some(),
            expires_at: state.expires_at,
        }
    }

    async fn renew(&self, state: &mut TokenState) -> Result<(), AthenaError> {
        let Some(refresh_token) = state.refresh_token.clone() else {
            return self.exchange(state, Grant::ClientCredentials).await;
        };

        match self.exchange(state, Grant::Refresh(&refresh_token)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("refresh grant failed, falling back to client credentials: {err}");
                self.exchange(state, Grant::ClientCredentials).await
            }
        }
    }

    /// Exchange credentials for a token; state only changes on success
    async fn exchange(&self, state: &mut TokenState, grant: Grant<'_>) -> Result<(), AthenaError> {
        let form: Vec<(&str, &str)> = match &grant {
            Grant::ClientCredentials => vec![("grant_type", "client_credentials"), ("scope", SCOPE)],
            Grant::Refresh(token) => vec![("grant_type", "refresh_token"), ("refresh_token", *token)],
        };

        debug!(grant = grant.name(), url = %self.token_url, "requesting access token");

        let result = self.request_token(&form).await;
        let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
        self.audit.auth_event(grant.name(), outcome);

        let token = result?;
        let refresh_token = match grant {
            Grant::ClientCredentials => token.refresh_token,
            Grant::Refresh(previous) => token.refresh_token.or_else(|| Some(previous.to_string())),
        };

        state.expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs.clamp(0, MAX_EXPIRES_IN_SECS)));
        state.access_token = Some(token.access_token);
        state.refresh_token = refresh_token;

        info!(expires_in = ?token.expires_in, "authentication successful");
        Ok(())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AthenaError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(form)
            .send()
            .await
            .map_err(|e| AthenaError::Authentication { message: e.to_string(), status: None })?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = ["error_description", "error", "message"]
                .iter()
                .find_map(|key| body.get(key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| format!("token endpoint returned {status}"));

            warn!(status = status.as_u16(), "authentication failed: {message}");
            return Err(AthenaError::Authentication { message, status: Some(status.as_u16()) });
        }

        response.json::<TokenResponse>().await.map_err(|e| AthenaError::Authentication {
            message: format!("invalid token response: {e}"),
            status: Some(status.as_u16()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::client::test_support::config_for;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(server: &MockServer) -> TokenManager {
        TokenManager::new(reqwest::Client::new(), &config_for(&server.uri()), Arc::new(AuditLogger::disabled()))
    }

    fn token_body(token: &str, expires_in: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": expires_in,
        }))
    }

    #[tokio::test]
    async fn test_reuses_fresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(token_body("tok-1", json!(3600)))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "tok-1");
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_token_inside_window_is_renewed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/token"))
            .respond_with(token_body("short-lived", json!(60)))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        tokens.ensure_valid_token().await.unwrap();
        tokens.ensure_valid_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_string_expiry_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/token"))
            .respond_with(token_body("tok", json!("3600")))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        tokens.ensure_valid_token().await.unwrap();
        let snapshot = tokens.snapshot().await;
        assert!(snapshot.expires_at.is_some_and(|at| at > Utc::now() + Duration::minutes(55)));
    }

    #[tokio::test]
    async fn test_refresh_grant_used_then_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "initial",
                "refresh_token": "refresh-1",
                "expires_in": 30,
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        tokens.ensure_valid_token().await.unwrap();
        assert!(tokens.snapshot().await.has_refresh_token);

        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "initial");
    }

    #[tokio::test]
    async fn test_failed_authentication_keeps_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
            .mount(&server)
            .await;

        let sink = MemorySink::new();
        let tokens = TokenManager::new(
            reqwest::Client::new(),
            &config_for(&server.uri()),
            Arc::new(AuditLogger::new(sink.clone())),
        );

        match tokens.ensure_valid_token().await {
            Err(AthenaError::Authentication { message, status }) => {
                assert_eq!(message, "invalid_client");
                assert_eq!(status, Some(401));
            }
            other => panic!("expected authentication error, got {other:?}"),
        }
        assert!(tokens.snapshot().await.is_empty());
        assert_eq!(sink.entries()[0]["result"], "failure");
    }

    #[tokio::test]
    async fn test_invalidate_forces_reauthentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_body("tok", json!(3600)))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        tokens.ensure_valid_token().await.unwrap();
        tokens.invalidate().await;
        assert!(tokens.snapshot().await.is_empty());

        tokens.ensure_valid_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_body("shared", json!(3600)).set_delay(std::time::Duration::from_millis(50)))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        let (a, b, c) = tokio::join!(
            tokens.ensure_valid_token(),
            tokens.ensure_valid_token(),
            tokens.ensure_valid_token()
        );
        assert_eq!(a.unwrap(), "shared");
        assert_eq!(b.unwrap(), "shared");
        assert_eq!(c.unwrap(), "shared");
    }
}
