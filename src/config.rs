use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::ImagePolicy;
use crate::net::{FetchConfig, DEFAULT_ENDPOINT};
use crate::sync::SyncSettings;

const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Connectivity gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    /// Seconds between background probes of the endpoint
    pub probe_interval_secs: u64,
    /// Treat the network as unreachable without probing
    pub offline: bool,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            offline: false,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite cache
    pub database_path: ConfigValue<PathBuf>,
    /// Categories endpoint
    pub endpoint: ConfigValue<String>,
    /// Quiet period before a search keyword is applied
    pub search_debounce_ms: ConfigValue<u64>,
    pub request_timeout_secs: ConfigValue<u64>,
    pub image_policy: ConfigValue<ImagePolicy>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub reachability: ReachabilityConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    endpoint: Option<String>,
    search_debounce_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    image_policy: Option<ImagePolicy>,
    reachability: Option<ReachabilityConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading environment variables through `env`.
    pub fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("glam.db");

        // Start with defaults
        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut endpoint = ConfigValue::new(DEFAULT_ENDPOINT.to_string(), ConfigSource::Default);
        let mut search_debounce_ms =
            ConfigValue::new(DEFAULT_SEARCH_DEBOUNCE_MS, ConfigSource::Default);
        let mut request_timeout_secs =
            ConfigValue::new(DEFAULT_REQUEST_TIMEOUT_SECS, ConfigSource::Default);
        let mut image_policy = ConfigValue::new(ImagePolicy::default(), ConfigSource::Default);
        let mut config_file = None;
        let mut reachability = ReachabilityConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(url) = file_config.endpoint {
                endpoint = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(ms) = file_config.search_debounce_ms {
                search_debounce_ms = ConfigValue::new(ms, ConfigSource::File);
            }
            if let Some(secs) = file_config.request_timeout_secs {
                request_timeout_secs = ConfigValue::new(secs, ConfigSource::File);
            }
            if let Some(policy) = file_config.image_policy {
                image_policy = ConfigValue::new(policy, ConfigSource::File);
            }
            if let Some(reach) = file_config.reachability {
                reachability = reach;
            }
        }

        // Apply environment variable overrides
        if let Some(db_path) = env("GLAM_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(url) = env("GLAM_ENDPOINT") {
            endpoint = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Some(ms) = env("GLAM_SEARCH_DEBOUNCE_MS") {
            search_debounce_ms = ConfigValue::new(
                parse_env("GLAM_SEARCH_DEBOUNCE_MS", &ms)?,
                ConfigSource::Environment,
            );
        }
        if let Some(policy) = env("GLAM_IMAGE_POLICY") {
            image_policy = ConfigValue::new(
                parse_env("GLAM_IMAGE_POLICY", &policy)?,
                ConfigSource::Environment,
            );
        }

        Ok(Self {
            database_path,
            endpoint,
            search_debounce_ms,
            request_timeout_secs,
            image_policy,
            config_file,
            reachability,
        })
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            endpoint: self.endpoint.value.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.value),
            image_policy: self.image_policy.value,
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            search_debounce: Duration::from_millis(self.search_debounce_ms.value),
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/glam/
    /// - macOS: ~/Library/Application Support/glam/
    /// - Windows: %APPDATA%/glam/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glam")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/glam/
    /// - macOS: ~/Library/Application Support/glam/
    /// - Windows: %APPDATA%/glam/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glam")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key, value.to_string()))
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
