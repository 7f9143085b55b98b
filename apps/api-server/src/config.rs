//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use thiserror::Error;
use url::Url;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// DynamoDB table named by `TABLE_NAME`
    Dynamo,
}

impl StorageProvider {
    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("memory") {
            Some(Self::Memory)
        } else if s.eq_ignore_ascii_case("dynamo") || s.eq_ignore_ascii_case("dynamodb") {
            Some(Self::Dynamo)
        } else {
            None
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Origins accepted by the CORS layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<HeaderValue>),
}

/// Configuration error.
#[derive(Debug, Error)]
#[error("Configuration error for {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// Public base URL used for short URLs and the fallback host
    pub api_url: String,
    /// DynamoDB table (required for dynamo storage)
    pub table_name: Option<String>,
    pub storage_provider: StorageProvider,
    /// Overrides the derived fallback redirect
    pub fallback_url: Option<String>,
    /// When set, admin routes require a matching `x-api-key` header
    pub admin_api_key: Option<String>,
    pub cors_origins: CorsOrigins,
    pub log_format: LogFormat,
    /// Started by the AWS Lambda runtime
    pub lambda: bool,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let lambda = var("AWS_LAMBDA_RUNTIME_API").is_some();

        // Port
        let port: u16 = match var("PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| ConfigError::new("PORT", format!("Invalid port '{p}'")))?,
            None => 3001,
        };

        // Public API URL
        let api_url = var("API_URL").ok_or_else(|| ConfigError::new("API_URL", "Required"))?;
        parse_absolute_url("API_URL", &api_url)?;

        // Storage
        let storage_provider = match var("STORAGE_PROVIDER") {
            Some(s) => StorageProvider::parse(&s).ok_or_else(|| {
                ConfigError::new(
                    "STORAGE_PROVIDER",
                    format!("Unknown provider '{s}' (expected 'dynamo' or 'memory')"),
                )
            })?,
            None => StorageProvider::Dynamo,
        };
        let table_name = var("TABLE_NAME");
        if storage_provider == StorageProvider::Dynamo && table_name.is_none() {
            return Err(ConfigError::new(
                "TABLE_NAME",
                "Required when STORAGE_PROVIDER=dynamo",
            ));
        }

        // Fallback redirect
        let fallback_url = var("FALLBACK_URL");
        if let Some(url) = &fallback_url {
            parse_absolute_url("FALLBACK_URL", url)?;
        }

        let admin_api_key = var("ADMIN_API_KEY");

        // CORS origins
        let cors_origins =
            parse_cors_origins(&var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "*".into()))?;

        // Log format: JSON by default under Lambda for CloudWatch
        let log_format = match var("LOG_FORMAT") {
            Some(f) => LogFormat::parse(&f),
            None if lambda => LogFormat::Json,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            port,
            api_url,
            table_name,
            storage_provider,
            fallback_url,
            admin_api_key,
            cors_origins,
            log_format,
            lambda,
        })
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if self.admin_api_key.is_none() {
            tracing::warn!(
                "ADMIN_API_KEY not set: admin routes (create/list/update/delete) are open. \
                 Set ADMIN_API_KEY unless an upstream gateway enforces access."
            );
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: links are lost on restart");
        }
    }
}

fn parse_absolute_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::new(field, format!("Invalid URL '{raw}': {e}")))?;
    if !url.has_host() {
        return Err(ConfigError::new(field, format!("URL '{raw}' has no host")));
    }
    Ok(url)
}

fn parse_cors_origins(raw: &str) -> Result<CorsOrigins, ConfigError> {
    if raw == "*" {
        return Ok(CorsOrigins::Any);
    }
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            HeaderValue::from_str(s).map_err(|e| {
                ConfigError::new(
                    "CORS_ALLOWED_ORIGINS",
                    format!("Invalid header value '{s}': {e}"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if origins.is_empty() {
        return Ok(CorsOrigins::Any);
    }
    Ok(CorsOrigins::List(origins))
}
