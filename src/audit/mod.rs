//! HIPAA-oriented audit trail
//!
//! Every upstream request/response and every caller-visible action is written
//! as one JSON line. Fields pass through the [`Redactor`] before they reach a
//! sink, and nothing in this module ever returns an error to the caller.

pub mod redactor;
pub mod sink;

use std::io;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::warn;

pub use redactor::{REDACTED, Redactor};
pub use sink::{AuditSink, MemorySink, NullSink, RotatingFileSink};

pub const SERVICE_NAME: &str = "athenahealth-mcp";
pub const AUDIT_FILE_NAME: &str = "audit.log";

/// Outcome attached to action events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn from_status(status: u16) -> Self {
        if status < 400 { Self::Success } else { Self::Failure }
    }
}

pub struct AuditLogger {
    service: String,
    redactor: Redactor,
    sink: Box<dyn AuditSink>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").field("service", &self.service).finish_non_exhaustive()
    }
}

impl AuditLogger {
    pub fn new(sink: impl AuditSink + 'static) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            redactor: Redactor::new(),
            sink: Box::new(sink),
        }
    }

    /// Logger that drops every entry
    pub fn disabled() -> Self {
        Self::new(NullSink)
    }

    /// File-backed logger under `dir`, or a disabled one when no dir is configured
    pub fn from_log_dir(dir: Option<&Path>) -> io::Result<Self> {
        match dir {
            Some(dir) => Ok(Self::new(RotatingFileSink::new(dir.join(AUDIT_FILE_NAME))?)),
            None => Ok(Self::disabled()),
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Record one event with free-form fields
    pub fn record<T: Serialize + ?Sized>(&self, event: &str, fields: &T) {
        let line = match serde_json::to_value(fields) {
            Ok(value) => self.render(event, &value),
            Err(err) => {
                warn!(event, "audit fields could not be serialized: {err}");
                self.render(event, &Value::Null)
            }
        };

        if let Err(err) = self.sink.write_line(&line) {
            warn!(event, "failed to write audit entry: {err}");
        }
    }

    fn render(&self, event: &str, fields: &Value) -> String {
        let mut entry = Map::new();
        match self.redactor.redact_value(fields) {
            Value::Object(map) => entry.extend(map),
            Value::Null => {}
            other => {
                entry.insert("data".to_string(), other);
            }
        }

        entry.insert("event".to_string(), Value::String(event.to_string()));
        entry.insert("service".to_string(), Value::String(self.service.clone()));
        entry.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));

        serde_json::to_string(&entry)
            .unwrap_or_else(|_| json!({"event": event, "service": self.service}).to_string())
    }

    pub fn api_request(&self, method: &str, path: &str) {
        self.record(
            "API_REQUEST",
            &json!({"method": method, "path": self.redactor.mask_path(path)}),
        );
    }

    pub fn api_response(&self, method: &str, status: u16, path: &str) {
        self.record(
            "API_RESPONSE",
            &json!({
                "method": method,
                "status": status,
                "path": self.redactor.mask_path(path),
                "result": AuditOutcome::from_status(status),
            }),
        );
    }

    pub fn auth_event(&self, event: &str, outcome: AuditOutcome) {
        self.record(
            "AUTHENTICATION",
            &json!({"resource_type": "AUTH_EVENT", "action": event, "result": outcome}),
        );
    }

    pub fn data_access(&self, resource_type: &str, action: &str) {
        self.record(
            "DATA_ACCESS",
            &json!({"resource_type": resource_type, "action": action, "result": AuditOutcome::Success}),
        );
    }

    pub fn action(&self, name: &str, resource_type: &str, outcome: AuditOutcome) {
        self.record(name, &json!({"resource_type": resource_type, "result": outcome}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn write_line(&self, _line: &str) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_record_redacts_fields() {
        let sink = MemorySink::new();
        let audit = AuditLogger::new(sink.clone());

        audit.record(
            "PATIENT_CREATE",
            &json!({"firstname": "John", "dob": "1990-01-01", "contact": {"phone": "5551234567"}}),
        );

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry["event"], "PATIENT_CREATE");
        assert_eq!(entry["service"], SERVICE_NAME);
        assert_eq!(entry["dob"], REDACTED);
        assert_eq!(entry["contact"]["phone"], REDACTED);
        assert_eq!(entry["firstname"], "John");
        assert!(entry["timestamp"].is_string());
    }

    #[test]
    fn test_api_events_mask_identifiers() {
        let sink = MemorySink::new();
        let audit = AuditLogger::new(sink.clone());

        audit.api_request("GET", "/v1/195900/patients/4412");
        audit.api_response("GET", 404, "/v1/195900/patients/4412");

        let entries = sink.entries();
        assert_eq!(entries[0]["path"], "/v1/{id}/patients/{id}");
        assert_eq!(entries[1]["status"], 404);
        assert_eq!(entries[1]["result"], "failure");
        assert!(!sink.lines().concat().contains("4412"));
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let audit = AuditLogger::new(FailingSink);
        audit.action("PATIENT_SEARCH", "PATIENT", AuditOutcome::Success);
    }

    #[test]
    fn test_scalar_fields_wrapped() {
        let sink = MemorySink::new();
        let audit = AuditLogger::new(sink.clone());
        audit.record("NOTE", "reach me at jane@example.com");

        let entry = &sink.entries()[0];
        assert_eq!(entry["data"], format!("reach me at {REDACTED}"));
    }
}
