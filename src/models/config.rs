// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ContentFormat;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Publisher API connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Rate limiter settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Extraction worker settings
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.apply_env();
            config
        })
    }

    /// Fill credentials from the environment when the file omits them.
    fn apply_env(&mut self) {
        if self.api.api_key.is_empty()
            && let Ok(key) = std::env::var("ELSEVIER_API_KEY")
        {
            self.api.api_key = key;
        }
        if self.api.insttoken.is_none()
            && let Ok(token) = std::env::var("ELSEVIER_INSTTOKEN")
        {
            self.api.insttoken = Some(token);
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::config("api.user_agent is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::config("api.timeout_secs must be > 0"));
        }
        if self.download.max_concurrent == 0 {
            return Err(AppError::config("download.max_concurrent must be > 0"));
        }
        if self.download.formats.is_empty() {
            return Err(AppError::config("download.formats must not be empty"));
        }
        if self.rate_limit.fallback_ceiling_secs == 0 {
            return Err(AppError::config(
                "rate_limit.fallback_ceiling_secs must be > 0",
            ));
        }
        Ok(())
    }

    /// Validate settings required for network commands.
    pub fn validate_credentials(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            return Err(AppError::config(
                "api.api_key is empty; set it in the config or via ELSEVIER_API_KEY",
            ));
        }
        Ok(())
    }
}

/// Publisher API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the content API
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// API key sent as X-ELS-APIKey (env: ELSEVIER_API_KEY)
    #[serde(default)]
    pub api_key: String,

    /// Optional institutional token sent as X-ELS-Insttoken
    #[serde(default)]
    pub insttoken: Option<String>,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retry budget for throttled and transient failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            api_key: String::new(),
            insttoken: None,
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
        }
    }
}

/// Download behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum concurrent article downloads
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Candidate full-text formats in fallback order
    #[serde(default = "defaults::formats")]
    pub formats: Vec<ContentFormat>,

    /// Root directory for the content cache
    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: String,

    /// Whether to consult the cache at all
    #[serde(default = "defaults::use_cache")]
    pub use_cache: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            formats: defaults::formats(),
            cache_dir: defaults::cache_dir(),
            use_cache: defaults::use_cache(),
        }
    }
}

/// Rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between requests in milliseconds
    #[serde(default = "defaults::min_interval")]
    pub min_interval_ms: u64,

    /// Delay applied after a throttling response with no server guidance
    #[serde(default = "defaults::fallback_ceiling")]
    pub fallback_ceiling_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: defaults::min_interval(),
            fallback_ceiling_secs: defaults::fallback_ceiling(),
        }
    }
}

/// Extraction worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Worker count for parallel extraction; 0 means available cores
    #[serde(default)]
    pub workers: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { workers: 0 }
    }
}

impl ExtractionConfig {
    /// Resolve the effective worker count.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

mod defaults {
    use crate::models::ContentFormat;

    pub fn base_url() -> String {
        "https://api.elsevier.com/content".into()
    }
    pub fn user_agent() -> String {
        "coordex/0.1.0".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> usize {
        3
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn formats() -> Vec<ContentFormat> {
        vec![ContentFormat::Xml, ContentFormat::Html]
    }
    pub fn cache_dir() -> String {
        ".coordex_cache".into()
    }
    pub fn use_cache() -> bool {
        true
    }
    pub fn min_interval() -> u64 {
        100
    }
    pub fn fallback_ceiling() -> u64 {
        60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.download.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_formats() {
        let mut config = Config::default();
        config.download.formats.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn credentials_require_api_key() {
        let config = Config::default();
        if std::env::var("ELSEVIER_API_KEY").is_err() {
            assert!(config.validate_credentials().is_err());
        }
        let mut config = config;
        config.api.api_key = "key".into();
        assert!(config.validate_credentials().is_ok());
    }

    #[test]
    fn toml_round_trip_keeps_formats() {
        let toml_src = r#"
            [download]
            formats = ["html", "xml"]
            max_concurrent = 2
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(
            config.download.formats,
            vec![ContentFormat::Html, ContentFormat::Xml]
        );
        assert_eq!(config.download.max_concurrent, 2);
    }
}
