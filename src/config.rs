//! Configuration loading and management for pagegist.
//!
//! Loads settings from `pagegist.toml` with environment variable overrides for sensitive data.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";
const DEFAULT_VERIFY_ENDPOINT: &str = "https://article-summarizer-tan-two.vercel.app/verify";
const DEFAULT_PROMPT: &str = "Summarize this webpage concisely in clear, simple language. \
Focus on the main points and key takeaways:";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid URL in {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        source: url::ParseError,
    },
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
    #[error("daily limit must be at least 1")]
    InvalidDailyLimit,
}

/// Generative API access (key is normally loaded from the environment)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub gemini_key: Option<String>,
    /// Base URL of the generative-language API, without trailing `/models`
    pub base_url: String,
}

/// Summarisation request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifiers, most capable first
    pub models: Vec<String>,
    /// Instruction placed in front of the page text
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// License verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    pub verify_endpoint: Url,
    /// Keys accepted without contacting the endpoint. When non-empty the
    /// remote endpoint is not used at all.
    pub valid_keys: Vec<String>,
}

/// Daily usage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub daily_limit: u32,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base path for data storage
    pub path: PathBuf,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// The values resolved once at startup and injected into every component.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: String,
    pub verify_endpoint: Url,
    pub daily_limit: u32,
}

impl Config {
    /// Load configuration from the default location (pagegist.toml in cwd or home)
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("no config file found, using defaults");
                let mut config = Config::default();
                config.apply_env()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse configuration from TOML text without consulting the environment
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        if config.usage.daily_limit == 0 {
            return Err(ConfigError::InvalidDailyLimit);
        }
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.api.gemini_key = Some(key);
        }
        if let Ok(endpoint) = std::env::var("PAGEGIST_VERIFY_ENDPOINT") {
            self.license.verify_endpoint =
                Url::parse(&endpoint).map_err(|source| ConfigError::InvalidUrl {
                    field: "PAGEGIST_VERIFY_ENDPOINT",
                    source,
                })?;
        }
        Ok(())
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // Check current directory first
        let local_config = PathBuf::from("pagegist.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config").join("pagegist").join("pagegist.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Get the Gemini API key
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api
            .gemini_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey("gemini".to_string()))
    }

    /// Resolve the runtime settings, failing if the API key is missing
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            api_key: self.api_key()?.to_string(),
            verify_endpoint: self.license.verify_endpoint.clone(),
            daily_limit: self.usage.daily_limit,
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            gemini_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            models: vec![
                "gemini-2.0-flash-exp".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-flash-latest".to_string(),
            ],
            prompt: DEFAULT_PROMPT.to_string(),
            temperature: 0.7,
            max_output_tokens: 500,
        }
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            verify_endpoint: Url::parse(DEFAULT_VERIFY_ENDPOINT)
                .expect("default verify endpoint is a valid URL"),
            valid_keys: Vec::new(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self { daily_limit: 5 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
        }
    }
}
