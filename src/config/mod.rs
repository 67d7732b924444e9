// Configuration module

mod limits;
mod staging;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use limits::LimitsConfig;
pub use staging::{StagingConfig, StagingDirs};

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{0}' is referenced but not set")]
    EnvVar(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to prepare staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerConfig>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Object storage connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    /// Static credentials. When unset the default AWS provider chain is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            force_path_style: false,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_asset_cache_entries() -> u64 {
    64
}

fn default_asset_cache_ttl_secs() -> u64 {
    3600 // 1 hour
}

/// Watermark rendering settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatermarkConfig {
    /// TrueType/OpenType font used for text watermarks. The embedded font is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_asset_cache_entries")]
    pub asset_cache_entries: u64,
    #[serde(default = "default_asset_cache_ttl_secs")]
    pub asset_cache_ttl_secs: u64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            asset_cache_entries: default_asset_cache_entries(),
            asset_cache_ttl_secs: default_asset_cache_ttl_secs(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_trigger_timeout_secs() -> u64 {
    10
}

/// Upload trigger settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Processing endpoint notified for unprocessed uploads
    pub api_url: String,
    #[serde(default = "default_trigger_timeout_secs")]
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            })
        });
        if let Some(var_name) = missing {
            return Err(ConfigError::EnvVar(var_name));
        }

        // An empty document means "all defaults"
        if substituted.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_yaml::from_str(&substituted).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_with_env(&yaml)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.region.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.region cannot be empty".to_string()));
        }

        if let Some(endpoint) = &self.storage.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "storage.endpoint '{}' must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(ConfigError::Invalid(
                "storage.access_key and storage.secret_key must be set together".to_string(),
            ));
        }

        self.staging.validate()?;

        if self.watermark.asset_cache_entries == 0 {
            return Err(ConfigError::Invalid(
                "watermark.asset_cache_entries must be greater than 0".to_string(),
            ));
        }

        if let Some(font_path) = &self.watermark.font_path {
            if font_path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "watermark.font_path cannot be empty".to_string(),
                ));
            }
        }

        self.limits.validate()?;

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level cannot be empty".to_string()));
        }

        if let Some(trigger) = &self.trigger {
            if trigger.api_url.trim().is_empty() {
                return Err(ConfigError::Invalid("trigger.api_url cannot be empty".to_string()));
            }
            if trigger.timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "trigger.timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
