//! PII redaction for audit and diagnostic payloads

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Marker written in place of every redacted value
pub const REDACTED: &str = "[REDACTED]";

/// Key fragments that flag a field as sensitive, matched case-insensitively
const SENSITIVE_KEY_TERMS: &[&str] = &[
    "ssn",
    "social_security",
    "tax_id",
    "password",
    "passwd",
    "token",
    "secret",
    "api_key",
    "apikey",
    "authorization",
    "dob",
    "date_of_birth",
    "birthdate",
    "phone",
    "mobile",
    "telephone",
    "email",
    "address",
    "street",
    "credit_card",
    "card_number",
    "account_number",
    "routing_number",
    "patient_id",
    "patientid",
    "medical_record",
    "mrn",
];

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // SSN
        r"\b\d{3}-\d{2}-\d{4}\b",
        // card numbers
        r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
        // phone numbers and other long identifiers
        r"\b\d{10,}\b",
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        r"\b\d{1,2}/\d{1,2}/\d{2,4}\b",
        r"\b\d{4}-\d{2}-\d{2}\b",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static NUMERIC_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d+$").ok());

/// Replaces sensitive keys and value patterns with [`REDACTED`]
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    extra_terms: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag additional key fragments beyond the built-in list
    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_terms
            .extend(terms.into_iter().map(|t| t.into().to_ascii_lowercase()));
        self
    }

    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        SENSITIVE_KEY_TERMS.iter().any(|term| key.contains(term))
            || self.extra_terms.iter().any(|term| key.contains(term.as_str()))
    }

    /// Redact pattern matches inside free text
    pub fn redact_str(&self, text: &str) -> String {
        SENSITIVE_PATTERNS
            .iter()
            .fold(text.to_string(), |acc, pattern| {
                pattern.replace_all(&acc, REDACTED).into_owned()
            })
    }

    /// Redact a JSON value at every nesting depth
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            Value::Object(map) => Value::Object(self.redact_map(map)),
            other => other.clone(),
        }
    }

    fn redact_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let redacted = if self.is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    self.redact_value(value)
                };
                (key.clone(), redacted)
            })
            .collect()
    }

    /// Collapse numeric path segments so identifiers never reach the audit trail
    pub fn mask_path(&self, path: &str) -> String {
        let Some(numeric) = NUMERIC_SEGMENT.as_ref() else {
            return REDACTED.to_string();
        };

        path.split('/')
            .map(|segment| if numeric.is_match(segment) { "{id}" } else { segment })
            .collect::<Vec<_>>()
            .join("/")
    }
}
