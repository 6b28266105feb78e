//! Configuration management for Atlas Agent.
//!
//! Configuration can be set via environment variables:
//! - `REASONING_API_KEY` - Required. API key for the reasoning backend.
//! - `REASONING_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to `https://api.openai.com/v1`.
//! - `REASONING_MODEL` - Optional. Model identifier. Defaults to `gpt-4.1`.
//! - `FEATURE_SERVICE_API_KEY` - Optional. Access token for the remote feature service.
//! - `REMOTE_LAYERS` - Optional. Comma-separated `id=url` pairs of feature layer endpoints.
//! - `LOCAL_TABLES` - Optional. Comma-separated `name=path` pairs of CSV tables loaded at startup.
//!   Defaults to `athletes=data/athletes.csv,events=data/events.csv`.
//! - `MAP_API_KEY` - Optional. Non-secret map key forwarded to the frontend.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `SESSION_TTL_SECS` - Optional. Session inactivity TTL. Defaults to `1800`.
//! - `SESSION_CAP` - Optional. Maximum live sessions. Defaults to `500`.
//! - `REQUEST_TIMEOUT_SECS` - Optional. Timeout for outbound calls. Defaults to `15`.
//! - `MAX_RESULT_ROWS` - Optional. Cap on rows per tool result. Defaults to `50`.
//! - `MAX_AGENT_STEPS` - Optional. Agent loop step budget. Defaults to `8`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Reasoning backend configuration. All values are opaque to the core.
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    /// API key for the backend
    pub api_key: String,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Model identifier
    pub model: String,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Reasoning backend settings
    pub reasoning: ReasoningConfig,

    /// Access token for the remote feature service (empty = anonymous)
    pub feature_service_api_key: Option<String>,

    /// Remote feature layers: (layer id, layer URL)
    pub remote_layers: Vec<(String, String)>,

    /// Local CSV tables: (table name, file path)
    pub local_tables: Vec<(String, PathBuf)>,

    /// Non-secret map key exposed to the frontend via `/config`
    pub map_api_key: String,

    /// Session inactivity TTL
    pub session_ttl: Duration,

    /// Maximum number of live sessions
    pub session_cap: usize,

    /// Timeout applied to outbound HTTP calls
    pub request_timeout: Duration,

    /// Maximum rows returned by a single tool call
    pub max_result_rows: usize,

    /// Maximum iterations of the agent loop per chat request
    pub max_agent_steps: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `REASONING_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("REASONING_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("REASONING_API_KEY".to_string()))?;

        let reasoning = ReasoningConfig {
            api_key,
            base_url: std::env::var("REASONING_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: std::env::var("REASONING_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string()),
        };

        let feature_service_api_key = std::env::var("FEATURE_SERVICE_API_KEY")
            .ok()
            .filter(|v| !v.is_empty());

        let remote_layers = parse_pairs(
            "REMOTE_LAYERS",
            &std::env::var("REMOTE_LAYERS").unwrap_or_default(),
        )?;

        let local_tables = parse_pairs(
            "LOCAL_TABLES",
            &std::env::var("LOCAL_TABLES")
                .unwrap_or_else(|_| "athletes=data/athletes.csv,events=data/events.csv".to_string()),
        )?
        .into_iter()
        .map(|(name, path)| (name, PathBuf::from(path)))
        .collect();

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        Ok(Self {
            host,
            port,
            reasoning,
            feature_service_api_key,
            remote_layers,
            local_tables,
            map_api_key: std::env::var("MAP_API_KEY").unwrap_or_default(),
            session_ttl: Duration::from_secs(parse_env_u64("SESSION_TTL_SECS", 1800)?),
            session_cap: parse_env_u64("SESSION_CAP", 500)? as usize,
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 15)?),
            max_result_rows: parse_env_u64("MAX_RESULT_ROWS", 50)? as usize,
            max_agent_steps: parse_env_u64("MAX_AGENT_STEPS", 8)? as usize,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            reasoning: ReasoningConfig {
                api_key,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4.1".to_string(),
            },
            feature_service_api_key: None,
            remote_layers: Vec::new(),
            local_tables: Vec::new(),
            map_api_key: String::new(),
            session_ttl: Duration::from_secs(1800),
            session_cap: 500,
            request_timeout: Duration::from_secs(15),
            max_result_rows: 50,
            max_agent_steps: 8,
        }
    }
}

fn parse_env_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list of `key=value` pairs.
///
/// Empty input yields an empty list. A segment without `=` or with an empty
/// key or value is rejected.
fn parse_pairs(var: &str, raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut pairs = Vec::new();
    for segment in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            ConfigError::InvalidValue(var.to_string(), format!("expected key=value, got: {}", segment))
        })?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(ConfigError::InvalidValue(
                var.to_string(),
                format!("empty key or value in: {}", segment),
            ));
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pairs_accepts_empty_input() {
        assert!(parse_pairs("X", "").expect("empty input is valid").is_empty());
    }

    #[test]
    fn parse_pairs_splits_multiple_entries() {
        let pairs = parse_pairs("X", "athletes=data/a.csv, events=data/e.csv")
            .expect("valid pair list");
        assert_eq!(
            pairs,
            vec![
                ("athletes".to_string(), "data/a.csv".to_string()),
                ("events".to_string(), "data/e.csv".to_string()),
            ]
        );
    }

    #[test]
    fn parse_pairs_preserves_equals_in_value() {
        let pairs = parse_pairs("X", "stores=https://example.com/q?f=json").expect("valid pair");
        assert_eq!(pairs[0].1, "https://example.com/q?f=json");
    }

    #[test]
    fn parse_pairs_rejects_missing_separator() {
        let err = parse_pairs("REMOTE_LAYERS", "not-a-pair").expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "REMOTE_LAYERS"));
    }

    #[test]
    fn parse_pairs_rejects_empty_key() {
        assert!(parse_pairs("X", "=value").is_err());
    }

    #[test]
    fn test_config_has_documented_defaults() {
        let config = Config::new("test-key".to_string());
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.session_cap, 500);
        assert_eq!(config.max_result_rows, 50);
        assert_eq!(config.max_agent_steps, 8);
    }
}
