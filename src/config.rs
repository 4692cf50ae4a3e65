/*!
 * Configuration for the Recall client
 *
 * Every reliability knob is loadable from the environment (RECALL_*) or
 * from a TOML file, with serde-supplied defaults. Configuration is
 * validated once at startup; nothing in the call pipeline re-checks it.
 */

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Main configuration for the memory client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the memory-storage API
    pub base_url: String,

    /// API key sent as a bearer token with every request
    pub api_key: String,

    /// Additional attempts after the first (0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Consecutive failures before the circuit opens
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    /// Open → half-open cooldown in milliseconds
    #[serde(default = "default_circuit_breaker_timeout_ms")]
    pub circuit_breaker_timeout_ms: u64,

    /// Freshness window for the fallback cache in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Health probe period in milliseconds
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Emit structured telemetry events
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Run the periodic health monitor
    #[serde(default = "default_true")]
    pub enable_health_checks: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_timeout_ms() -> u64 {
    60_000
}

fn default_cache_ttl_ms() -> u64 {
    3_600_000
}

fn default_health_check_interval_ms() -> u64 {
    300_000
}

fn default_true() -> bool {
    true
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the
    /// required fields
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_timeout_ms: default_circuit_breaker_timeout_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            enable_metrics: default_true(),
            enable_health_checks: default_true(),
        }
    }

    /// Load configuration from RECALL_* environment variables.
    ///
    /// RECALL_BASE_URL and RECALL_API_KEY are required; every other
    /// variable falls back to its default.
    pub fn from_env() -> Result<Self> {
        let base_url = require_env("RECALL_BASE_URL")?;
        let api_key = require_env("RECALL_API_KEY")?;

        let mut config = Self::new(base_url, api_key);
        if let Some(v) = parse_env("RECALL_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = parse_env("RECALL_BASE_DELAY_MS")? {
            config.base_delay_ms = v;
        }
        if let Some(v) = parse_env("RECALL_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = v;
        }
        if let Some(v) = parse_env("RECALL_CIRCUIT_BREAKER_THRESHOLD")? {
            config.circuit_breaker_threshold = v;
        }
        if let Some(v) = parse_env("RECALL_CIRCUIT_BREAKER_TIMEOUT_MS")? {
            config.circuit_breaker_timeout_ms = v;
        }
        if let Some(v) = parse_env("RECALL_CACHE_TTL_MS")? {
            config.cache_ttl_ms = v;
        }
        if let Some(v) = parse_env("RECALL_HEALTH_CHECK_INTERVAL_MS")? {
            config.health_check_interval_ms = v;
        }
        if let Some(v) = parse_env("RECALL_ENABLE_METRICS")? {
            config.enable_metrics = v;
        }
        if let Some(v) = parse_env("RECALL_ENABLE_HEALTH_CHECKS")? {
            config.enable_health_checks = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApiError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ApiError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the call pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ApiError::Config("base_url must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::Config(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.api_key.is_empty() {
            return Err(ApiError::Config("api_key must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ApiError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ApiError::Config(
                "circuit_breaker_threshold must be positive".to_string(),
            ));
        }
        if self.health_check_interval_ms == 0 && self.enable_health_checks {
            return Err(ApiError::Config(
                "health_check_interval_ms must be positive when health checks are enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Redacted view of the active configuration for the status query
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            base_url: self.base_url.clone(),
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            request_timeout_ms: self.request_timeout_ms,
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            circuit_breaker_timeout_ms: self.circuit_breaker_timeout_ms,
            cache_ttl_ms: self.cache_ttl_ms,
            health_check_interval_ms: self.health_check_interval_ms,
            enable_metrics: self.enable_metrics,
            enable_health_checks: self.enable_health_checks,
        }
    }
}

/// Active configuration without the credential, safe to print
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub base_url: String,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub health_check_interval_ms: u64,
    pub enable_metrics: bool,
    pub enable_health_checks: bool,
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ApiError::Config(format!("{} is not set", name)))
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::Config(format!("{} has invalid value {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ClientConfig {
        ClientConfig::new("https://memories.example.com", "sk-test")
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = valid();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.circuit_breaker_timeout_ms, 60_000);
        assert_eq!(config.cache_ttl_ms, 3_600_000);
        assert_eq!(config.health_check_interval_ms, 300_000);
        assert!(config.enable_metrics);
        assert!(config.enable_health_checks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_missing_url_and_key() {
        let mut config = valid();
        config.base_url = String::new();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.api_key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_http_url() {
        let mut config = valid();
        config.base_url = "ftp://memories.example.com".to_string();
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = valid();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_toml_with_partial_overrides() {
        let toml = r#"
            base_url = "https://memories.example.com"
            api_key = "sk-test"
            max_retries = 1
            enable_health_checks = false
        "#;
        let config: ClientConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(config.max_retries, 1);
        assert!(!config.enable_health_checks);
        // Unspecified knobs keep their defaults
        assert_eq!(config.cache_ttl_ms, 3_600_000);
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("recall.toml");

        std::fs::write(
            &path,
            "base_url = \"https://memories.example.com\"\napi_key = \"sk-test\"\n",
        )
        .expect("write failed");
        let config = ClientConfig::from_file(&path).expect("load failed");
        assert_eq!(config.base_url, "https://memories.example.com");

        // Files that parse but fail validation are rejected too
        std::fs::write(&path, "base_url = \"ftp://x\"\napi_key = \"sk-test\"\n")
            .expect("write failed");
        assert!(ClientConfig::from_file(&path).is_err());
    }

    #[test]
    fn summary_omits_the_api_key() {
        let summary = valid().summary();
        let json = serde_json::to_string(&summary).expect("serialize failed");
        assert!(!json.contains("sk-test"));
        assert!(json.contains("memories.example.com"));
    }
}
