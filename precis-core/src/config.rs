//! Configuration management for Precis.
//!
//! Configuration is loaded in order of precedence:
//! 1. Defaults
//! 2. Config file (~/.precis/config.toml)
//! 3. Environment variables
//! 4. CLI flags (handled at CLI layer)

use crate::budget::SummaryLevel;
use crate::chunker::DEFAULT_MAX_CHUNK_TOKENS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Token values that ship in sample configs and must never reach the API
pub const TOKEN_PLACEHOLDERS: &[&str] = &[
    "PLEASE_SET_YOUR_REPLICATE_API_TOKEN_ENVIRONMENT_VARIABLE",
    "YOUR_HARDCODED_REPLICATE_API_TOKEN_HERE",
];

/// An API token that may be missing or still set to a placeholder
#[derive(Clone, Default)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }

    /// Whether the token is present and not a placeholder
    pub fn is_configured(&self) -> bool {
        match self.0.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(token) => !TOKEN_PLACEHOLDERS.contains(&token) && !token.starts_with("YOUR_"),
        }
    }

    /// The raw token, only when configured
    pub fn token(&self) -> Option<&str> {
        if self.is_configured() {
            self.0.as_deref().map(str::trim)
        } else {
            None
        }
    }

    /// Token with everything but the first four characters hidden
    pub fn masked(&self) -> String {
        match self.token() {
            Some(token) => {
                let prefix: String = token.chars().take(4).collect();
                format!("{}…", prefix)
            }
            None => "(not set)".to_string(),
        }
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self(Some(token.to_string()))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

/// Remote completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of the predictions API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model identifier (owner/name)
    #[serde(default = "default_model")]
    pub model: String,

    /// API token (prefer PRECIS_API_TOKEN or REPLICATE_API_TOKEN)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Upper bound on a single completion, polling included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay between status polls for predictions that outlive the sync wait
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_api_base() -> String {
    "https://api.replicate.com/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4.1-nano".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Chunking and map-reduce configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Token ceiling for a single chunk
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: u32,

    /// Map-stage calls in flight at once (1 = strictly sequential)
    #[serde(default = "default_map_concurrency")]
    pub map_concurrency: usize,

    /// Level used when none is given on the command line
    #[serde(default)]
    pub default_level: SummaryLevel,
}

fn default_max_chunk_tokens() -> u32 {
    DEFAULT_MAX_CHUNK_TOKENS
}

fn default_map_concurrency() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: default_max_chunk_tokens(),
            map_concurrency: default_map_concurrency(),
            default_level: SummaryLevel::default(),
        }
    }
}

/// Minimum quality a PDF must meet before it is summarized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    #[serde(default = "default_min_pages")]
    pub min_pages: u32,

    /// Largest tolerated share of pages without extractable text
    #[serde(default = "default_max_empty_page_ratio")]
    pub max_empty_page_ratio: f64,

    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Characters (whitespace-normalized) for a page to count as substantial
    #[serde(default = "default_substantial_page_chars")]
    pub substantial_page_chars: usize,

    #[serde(default = "default_min_avg_chars_per_page")]
    pub min_avg_chars_per_page: f64,
}

fn default_min_words() -> usize {
    500
}

fn default_min_pages() -> u32 {
    1
}

fn default_max_empty_page_ratio() -> f64 {
    0.7
}

fn default_min_file_bytes() -> u64 {
    1024
}

fn default_max_file_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_substantial_page_chars() -> usize {
    100
}

fn default_min_avg_chars_per_page() -> f64 {
    200.0
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            min_pages: default_min_pages(),
            max_empty_page_ratio: default_max_empty_page_ratio(),
            min_file_bytes: default_min_file_bytes(),
            max_file_bytes: default_max_file_bytes(),
            substantial_page_chars: default_substantial_page_chars(),
            min_avg_chars_per_page: default_min_avg_chars_per_page(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Returns the default Precis configuration directory (~/.precis)
    pub fn precis_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".precis"))
    }

    /// Returns the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::precis_dir().map(|d| d.join("config.toml"))
    }

    /// Load configuration from the default path with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // PRECIS_API_TOKEN wins over the service's conventional variable
        if let Some(token) = lookup("PRECIS_API_TOKEN").or_else(|| lookup("REPLICATE_API_TOKEN")) {
            self.completion.api_token = Some(token);
        }

        if let Some(model) = lookup("PRECIS_MODEL") {
            self.completion.model = model;
        }

        if let Some(base) = lookup("PRECIS_API_BASE") {
            self.completion.api_base = base;
        }

        if let Some(level) = lookup("PRECIS_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(tokens) = lookup("PRECIS_MAX_CHUNK_TOKENS") {
            if let Ok(tokens) = tokens.parse() {
                self.pipeline.max_chunk_tokens = tokens;
            }
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_chunk_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_chunk_tokens must be greater than zero".to_string(),
            ));
        }
        if self.pipeline.map_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.map_concurrency must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.validation.max_empty_page_ratio) {
            return Err(ConfigError::ValidationError(
                "validation.max_empty_page_ratio must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The API token as a credential
    pub fn credential(&self) -> Credential {
        Credential::new(self.completion.api_token.clone())
    }

    /// Save configuration to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Ensure the Precis directory exists
    pub fn ensure_dirs() -> std::io::Result<()> {
        if let Some(dir) = Self::precis_dir() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
