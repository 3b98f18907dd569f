//! Error taxonomy shared by the client core and both front ends

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::{ApiTier, ConfigError};

/// Uniform representation of a failed upstream call
///
/// Built exactly once where the call fails; later layers move it around but
/// never wrap it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl NormalizedError {
    /// Normalize a non-2xx response body
    pub fn from_response(status: u16, body: Value) -> Self {
        let text = |key: &str| match body.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        let message = text("message").unwrap_or_else(|| {
            let reason = reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unexpected response");
            format!("Request failed with status code {status} ({reason})")
        });

        Self {
            error: text("error").unwrap_or_else(|| "Unknown error".to_string()),
            message,
            detailcode: text("detailcode"),
            details: body.get("details").filter(|v| !v.is_null()).cloned(),
            response: (!body.is_null()).then_some(body),
            status: Some(status),
        }
    }

    /// Normalize a transport failure (timeout, refused connection, bad body)
    ///
    /// The request URL carries search filters in its query string, so it is
    /// stripped before the error is rendered.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let timed_out = err.is_timeout();
        let err = err.without_url();

        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        let mut cause = None;
        while let Some(inner) = source {
            cause = Some(inner.to_string());
            source = inner.source();
        }
        if let Some(cause) = cause.filter(|c| !message.contains(c.as_str())) {
            message = format!("{message}: {cause}");
        }
        if timed_out {
            message = format!("Request timed out: {message}");
        }

        Self {
            error: "Unknown error".to_string(),
            message,
            detailcode: None,
            details: None,
            response: None,
            status,
        }
    }
}

/// Guidance returned when caller input is rejected before any upstream call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub error: String,
    pub message: String,
    pub example: Value,
}

/// Errors produced by the upstream client
#[derive(Debug, Error)]
pub enum AthenaError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to authenticate with athenahealth API: {message}")]
    Authentication { message: String, status: Option<u16> },

    #[error("{}", .0.message)]
    Upstream(NormalizedError),

    #[error("{}", .0.message)]
    Validation(Guidance),

    #[error("{}", .upstream.message)]
    UnavailableEndpoint { upstream: NormalizedError, note: String },
}

impl From<ConfigError> for AthenaError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl AthenaError {
    /// HTTP status reported by the upstream, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } => *status,
            Self::Upstream(e) | Self::UnavailableEndpoint { upstream: e, .. } => e.status,
            Self::Configuration(_) | Self::Validation(_) => None,
        }
    }

    /// Reclassify 403/404 from endpoints the preview tier does not provision
    pub fn for_tier(self, tier: ApiTier, note: &str) -> Self {
        match self {
            Self::Upstream(upstream)
                if tier == ApiTier::Preview && matches!(upstream.status, Some(403 | 404)) =>
            {
                Self::UnavailableEndpoint { upstream, note: note.to_string() }
            }
            other => other,
        }
    }

    /// Structured payload for the tool surface
    pub fn to_tool_payload(&self, context: &str) -> Value {
        match self {
            Self::Validation(guidance) => json!({
                "error": guidance.error,
                "message": guidance.message,
                "example": guidance.example,
            }),
            Self::Upstream(e) => json!({
                "error": context,
                "message": e.message,
                "error_code": e.error,
                "detailcode": e.detailcode,
                "details": e.details,
                "api_response": e.response,
                "status": e.status,
            }),
            Self::UnavailableEndpoint { upstream, note } => json!({
                "error": context,
                "message": upstream.message,
                "error_code": upstream.error,
                "status": upstream.status,
                "note": note,
            }),
            Self::Authentication { message, status } => json!({
                "error": context,
                "message": format!("Failed to authenticate with athenahealth API: {message}"),
                "error_code": "authentication_failed",
                "status": status,
            }),
            Self::Configuration(message) => json!({
                "error": context,
                "message": message,
                "error_code": "configuration_error",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_upstream_body() {
        let body = json!({
            "error": "Invalid patient",
            "message": "The patient ID is not valid",
            "detailcode": "PATIENT_NOT_FOUND",
            "details": {"patientid": "abc"}
        });

        let err = NormalizedError::from_response(400, body.clone());
        assert_eq!(err.error, "Invalid patient");
        assert_eq!(err.message, "The patient ID is not valid");
        assert_eq!(err.detailcode.as_deref(), Some("PATIENT_NOT_FOUND"));
        assert_eq!(err.details, Some(json!({"patientid": "abc"})));
        assert_eq!(err.response, Some(body));
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn test_falls_back_when_fields_absent() {
        let err = NormalizedError::from_response(502, Value::Null);
        assert_eq!(err.error, "Unknown error");
        assert!(err.message.contains("502"));
        assert!(err.detailcode.is_none());
        assert!(err.response.is_none());
    }

    #[test]
    fn test_preview_tier_reclassifies_not_found() {
        let source = NormalizedError::from_response(404, json!({"error": "Not found"}));
        let err = AthenaError::Upstream(source).for_tier(ApiTier::Preview, "not provisioned");

        match err {
            AthenaError::UnavailableEndpoint { upstream, note } => {
                assert_eq!(upstream.status, Some(404));
                assert_eq!(note, "not provisioned");
            }
            other => panic!("expected unavailable endpoint, got {other:?}"),
        }
    }

    #[test]
    fn test_production_tier_keeps_upstream_error() {
        let source = NormalizedError::from_response(404, json!({}));
        let err = AthenaError::Upstream(source).for_tier(ApiTier::Production, "note");
        assert!(matches!(err, AthenaError::Upstream(_)));

        let source = NormalizedError::from_response(500, json!({}));
        let err = AthenaError::Upstream(source).for_tier(ApiTier::Preview, "note");
        assert!(matches!(err, AthenaError::Upstream(_)));
    }

    #[test]
    fn test_tool_payload_carries_note() {
        let err = AthenaError::UnavailableEndpoint {
            upstream: NormalizedError::from_response(403, json!({"message": "Forbidden"})),
            note: "requires production access".to_string(),
        };

        let payload = err.to_tool_payload("Failed to create prescription");
        assert_eq!(payload["error"], "Failed to create prescription");
        assert_eq!(payload["message"], "Forbidden");
        assert_eq!(payload["status"], 403);
        assert_eq!(payload["note"], "requires production access");
    }
}
