//! Configuration system for the RAPTOR RAG service.
//!
//! Supports loading configuration from:
//! 1. An explicit path (`AppConfig::load(Some(path))`)
//! 2. `~/.config/raptor-rag/config.{APP_ENV}.toml`
//! 3. Default values
//!
//! Where `APP_ENV` can be: production (default), development, test.
//!
//! Environment variables override file values, grouped by the four prefixes
//! the service recognizes: `APP_` for general settings, `VECTOR_` for the
//! vector-index backend, `EMBEDDING_` for the embedding gateway, and
//! `RAPTOR_` for tree-builder parameters.
//!
//! ```no_run
//! use raptor_rag::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! println!("embedding model: {}", config.embedding.model);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// `database.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_dsn")]
    pub dsn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_root_cert: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_pool_overflow")]
    pub pool_max_overflow: u32,
    #[serde(default = "default_pool_recycle_secs")]
    pub pool_recycle_secs: u64,
}

fn default_dsn() -> String {
    "postgres://localhost/raptor".to_string()
}
fn default_pool_size() -> u32 {
    20
}
fn default_pool_overflow() -> u32 {
    30
}
fn default_pool_recycle_secs() -> u64 {
    3600
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: default_dsn(),
            ssl_root_cert: None,
            pool_size: default_pool_size(),
            pool_max_overflow: default_pool_overflow(),
            pool_recycle_secs: default_pool_recycle_secs(),
        }
    }
}

/// `embedding.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embedding_rpm")]
    pub rpm_limit: u32,
}

fn default_embedding_model() -> String {
    "text-embedding-3".to_string()
}
fn default_embedding_dimension() -> usize {
    1024
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedding_concurrency() -> usize {
    4
}
fn default_embedding_rpm() -> u32 {
    3000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            api_key: None,
            base_url: default_embedding_base_url(),
            concurrency: default_embedding_concurrency(),
            rpm_limit: default_embedding_rpm(),
        }
    }
}

impl EmbeddingConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(&self.api_key)
    }
}

/// `summarizer.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_summarizer_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_summarizer_max_tokens")]
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
}

fn default_summarizer_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_summarizer_max_tokens() -> usize {
    512
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            default_model: default_summarizer_model(),
            temperature: default_temperature(),
            max_tokens: default_summarizer_max_tokens(),
            api_key: None,
            base_url: default_embedding_base_url(),
        }
    }
}

impl SummarizerConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(&self.api_key)
    }
}

/// `raptor.*` section — tree-builder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaptorConfig {
    #[serde(default = "default_min_k")]
    pub min_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_rpm_limit")]
    pub rpm_limit: u32,
    #[serde(default = "default_llm_concurrency")]
    pub llm_concurrency: usize,
    #[serde(default = "default_max_tree_levels")]
    pub max_tree_levels: usize,
}

fn default_min_k() -> usize {
    2
}
fn default_max_k() -> usize {
    50
}
fn default_max_tokens() -> usize {
    512
}
fn default_rpm_limit() -> u32 {
    3
}
fn default_llm_concurrency() -> usize {
    3
}
fn default_max_tree_levels() -> usize {
    10
}

impl Default for RaptorConfig {
    fn default() -> Self {
        Self {
            min_k: default_min_k(),
            max_k: default_max_k(),
            max_tokens: default_max_tokens(),
            rpm_limit: default_rpm_limit(),
            llm_concurrency: default_llm_concurrency(),
            max_tree_levels: default_max_tree_levels(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub raptor: RaptorConfig,
    #[serde(default)]
    pub debug: bool,
}

/// Resolve a config value that may be a literal secret or the name of an
/// environment variable holding it (all-uppercase + underscores heuristic).
fn resolve_secret(value: &Option<String>) -> Option<String> {
    value.as_ref().and_then(|v| {
        if !v.is_empty() && v.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
            std::env::var(v).ok()
        } else {
            Some(v.clone())
        }
    })
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load with priority: explicit path, then
    /// `~/.config/raptor-rag/config.{APP_ENV}.toml`, then defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            if path.exists() {
                tracing::info!(?path, "loading config from explicit path");
                return Self::from_file(path);
            }
            return Err(ConfigError::ValidationError(format!(
                "config file not found: {:?}",
                path
            )));
        }

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "production".to_string());
        if let Some(dir) = Self::config_dir() {
            let path = dir.join(format!("config.{}.toml", env));
            if path.exists() {
                tracing::info!(?path, "loading config from standard location");
                return Self::from_file(&path);
            }
        }

        tracing::info!("using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dsn) = std::env::var("APP_DATABASE_DSN") {
            self.database.dsn = dsn;
        }
        if let Ok(cert) = std::env::var("APP_DATABASE_SSL_ROOT_CERT") {
            self.database.ssl_root_cert = Some(cert);
        }
        if let Ok(debug) = std::env::var("APP_DEBUG") {
            self.debug = parse_bool(&debug);
        }

        if let Ok(lists) = std::env::var("VECTOR_INDEX_LISTS") {
            tracing::debug!(lists, "VECTOR_INDEX_LISTS override observed");
        }

        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(dim) = std::env::var("EMBEDDING_DIMENSION") {
            if let Ok(dim) = dim.parse() {
                self.embedding.dimension = dim;
            }
        }
        if let Ok(key) = std::env::var("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }

        if let Ok(min_k) = std::env::var("RAPTOR_MIN_K") {
            if let Ok(v) = min_k.parse() {
                self.raptor.min_k = v;
            }
        }
        if let Ok(max_k) = std::env::var("RAPTOR_MAX_K") {
            if let Ok(v) = max_k.parse() {
                self.raptor.max_k = v;
            }
        }
        if let Ok(rpm) = std::env::var("RAPTOR_RPM_LIMIT") {
            if let Ok(v) = rpm.parse() {
                self.raptor.rpm_limit = v;
            }
        }
        if let Ok(concurrency) = std::env::var("RAPTOR_LLM_CONCURRENCY") {
            if let Ok(v) = concurrency.parse() {
                self.raptor.llm_concurrency = v;
            }
        }
        if let Ok(levels) = std::env::var("RAPTOR_MAX_TREE_LEVELS") {
            if let Ok(v) = levels.parse() {
                self.raptor.max_tree_levels = v;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.dsn.is_empty() {
            return Err(ConfigError::ValidationError("database.dsn cannot be empty".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError("embedding.dimension must be > 0".into()));
        }
        if !(0.0..=2.0).contains(&self.summarizer.temperature) {
            return Err(ConfigError::ValidationError(
                "summarizer.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.raptor.min_k == 0 || self.raptor.max_k < self.raptor.min_k {
            return Err(ConfigError::ValidationError(
                "raptor.min_k must be > 0 and <= raptor.max_k".into(),
            ));
        }
        if self.raptor.rpm_limit == 0 {
            return Err(ConfigError::ValidationError("raptor.rpm_limit must be > 0".into()));
        }
        if self.raptor.llm_concurrency == 0 {
            return Err(ConfigError::ValidationError("raptor.llm_concurrency must be > 0".into()));
        }
        if self.raptor.max_tree_levels == 0 {
            return Err(ConfigError::ValidationError(
                "raptor.max_tree_levels must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("raptor-rag"))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn parse_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true") || s == "1" || s.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.dimension, 1024);
        assert_eq!(config.raptor.min_k, 2);
        assert_eq!(config.raptor.max_k, 50);
    }

    #[test]
    fn rejects_inverted_k_bounds() {
        let mut config = AppConfig::default();
        config.raptor.max_k = 1;
        config.raptor.min_k = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolves_env_var_secret() {
        std::env::set_var("RAPTOR_TEST_SECRET_XYZ", "sk-test-123");
        let resolved = resolve_secret(&Some("RAPTOR_TEST_SECRET_XYZ".to_string()));
        assert_eq!(resolved.as_deref(), Some("sk-test-123"));
        std::env::remove_var("RAPTOR_TEST_SECRET_XYZ");
    }

    #[test]
    fn literal_api_key_passes_through() {
        let resolved = resolve_secret(&Some("sk-literal-value".to_string()));
        assert_eq!(resolved.as_deref(), Some("sk-literal-value"));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.embedding.model, parsed.embedding.model);
    }
}
