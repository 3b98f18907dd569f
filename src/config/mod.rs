//! Configuration management
//!
//! Upstream credentials are read from the environment once at startup and are
//! immutable afterwards. Transport settings for the MCP binary come from CLI
//! flags and live in [`ServerConfig`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PRODUCTION_TOKEN_URL: &str = "https://api.platform.athenahealth.com/oauth2/v1/token";
pub const PREVIEW_TOKEN_URL: &str = "https://api.preview.platform.athenahealth.com/oauth2/v1/token";

const DEFAULT_VERSION: &str = "v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors raised while loading configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Deployment environment of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("expected development, production or test, got '{other}'")),
        }
    }
}

/// Log verbosity accepted from `LOG_LEVEL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!("expected error, warn, info or debug, got '{other}'")),
        }
    }
}

/// Which upstream tier the base URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiTier {
    Preview,
    Production,
}

impl ApiTier {
    /// Any host containing `preview` is treated as the preview/sandbox tier
    pub fn from_base_url(url: &Url) -> Self {
        match url.host_str() {
            Some(host) if host.contains("preview") => Self::Preview,
            _ => Self::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Production => "production",
        }
    }

    pub fn default_token_url(&self) -> &'static str {
        match self {
            Self::Preview => PREVIEW_TOKEN_URL,
            Self::Production => PRODUCTION_TOKEN_URL,
        }
    }
}

impl FromStr for ApiTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preview" | "sandbox" => Ok(Self::Preview),
            "production" => Ok(Self::Production),
            other => Err(format!("expected preview or production, got '{other}'")),
        }
    }
}

/// Credentials and endpoint settings for the upstream API
#[derive(Debug, Clone)]
pub struct AthenaConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub practice_id: String,
    pub base_url: Url,
    pub version: String,
    pub environment: Environment,
    pub log_level: LogLevel,
    /// Overrides the tier derived from the base URL host
    pub api_tier: Option<ApiTier>,
    /// Overrides the tier-derived OAuth endpoint
    pub token_url: Option<Url>,
    pub request_timeout: Duration,
    /// Directory for rotated diagnostic and audit logs
    pub log_dir: Option<PathBuf>,
}

impl AthenaConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let client_id = required("ATHENA_CLIENT_ID")?;
        let client_secret = SecretString::new(required("ATHENA_CLIENT_SECRET")?);
        let practice_id = required("ATHENA_PRACTICE_ID")?;
        let base_url = parse_http_url("ATHENA_BASE_URL", &required("ATHENA_BASE_URL")?)?;

        let version = get("ATHENA_VERSION").unwrap_or_else(|| DEFAULT_VERSION.to_string());

        let environment = match get("ATHENA_ENV").or_else(|| get("NODE_ENV")) {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { var: "ATHENA_ENV", reason })?,
            None => Environment::default(),
        };

        let log_level = match get("LOG_LEVEL") {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { var: "LOG_LEVEL", reason })?,
            None => LogLevel::default(),
        };

        let api_tier = get("ATHENA_API_TIER")
            .map(|raw| {
                raw.parse::<ApiTier>()
                    .map_err(|reason| ConfigError::Invalid { var: "ATHENA_API_TIER", reason })
            })
            .transpose()?;

        let token_url = get("ATHENA_TOKEN_URL")
            .map(|raw| parse_http_url("ATHENA_TOKEN_URL", &raw))
            .transpose()?;

        let request_timeout = match get("ATHENA_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "ATHENA_TIMEOUT_SECS",
                    reason: format!("'{raw}' is not a whole number of seconds"),
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            client_id,
            client_secret,
            practice_id,
            base_url,
            version,
            environment,
            log_level,
            api_tier,
            token_url,
            request_timeout,
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn tier(&self) -> ApiTier {
        self.api_tier.unwrap_or_else(|| ApiTier::from_base_url(&self.base_url))
    }

    /// OAuth token endpoint, honouring an explicit override
    pub fn token_endpoint(&self) -> Url {
        if let Some(url) = &self.token_url {
            return url.clone();
        }
        // The tier defaults are static, well-formed URLs
        Url::parse(self.tier().default_token_url()).unwrap_or_else(|_| self.base_url.clone())
    }
}

fn parse_http_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid { var, reason: e.to_string() })?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ConfigError::Invalid { var, reason: format!("'{raw}' is not an http(s) URL") }),
    }
}

/// Server configuration for the MCP binary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server host (default: localhost)
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Log level (default: info)
    pub log_level: String,
    /// Enable HTTP transport
    pub http_transport: bool,
    /// Enable stdio transport
    pub stdio_transport: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            http_transport: false,
            stdio_transport: true,
        }
    }
}
