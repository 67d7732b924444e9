// Local staging directories
//
// Created once by the hosting process before the first invocation and passed
// down as handles; nothing in the pipeline creates directories on its own.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ConfigError;

fn default_root() -> PathBuf {
    PathBuf::from("/tmp/imgpipe")
}

fn default_watermark_dir() -> PathBuf {
    PathBuf::from("wm")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagingConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Watermark assets, relative to `root` unless absolute
    #[serde(default = "default_watermark_dir")]
    pub watermark_dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            watermark_dir: default_watermark_dir(),
        }
    }
}

impl StagingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("staging.root cannot be empty".to_string()));
        }
        if self.watermark_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "staging.watermark_dir cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handles to prepared staging directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDirs {
    root: PathBuf,
    watermark_dir: PathBuf,
}

impl StagingDirs {
    /// Create the staging directories if missing.
    pub fn prepare(config: &StagingConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let watermark_dir = config.root.join(&config.watermark_dir);
        for dir in [&config.root, &watermark_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Staging {
                path: dir.clone(),
                source,
            })?;
        }

        tracing::debug!(
            root = %config.root.display(),
            watermark_dir = %watermark_dir.display(),
            "Staging directories ready"
        );

        Ok(Self {
            root: config.root.clone(),
            watermark_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watermark_dir(&self) -> &Path {
        &self.watermark_dir
    }
}
