// Output size limits for request-controlled dimensions

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::error::PipelineError;

fn default_max_width() -> u32 {
    8192
}

fn default_max_height() -> u32 {
    8192
}

fn default_max_pixels() -> u64 {
    40_000_000 // 40 megapixels
}

fn default_max_font_size() -> u32 {
    1000
}

/// Caps on buffers sized by the operation string.
///
/// Resize targets and rendered text are checked against these before any
/// pixel buffer is allocated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitsConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    /// Width x height budget
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    #[serde(default = "default_max_font_size")]
    pub max_font_size: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            max_pixels: default_max_pixels(),
            max_font_size: default_max_font_size(),
        }
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_width and limits.max_height must be greater than 0".to_string(),
            ));
        }
        if self.max_pixels == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_pixels must be greater than 0".to_string(),
            ));
        }
        if self.max_font_size == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_font_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject a `width` x `height` buffer that exceeds any limit.
    pub fn check_dimensions(&self, width: u64, height: u64) -> Result<(), PipelineError> {
        let too_large = |reason: String| {
            PipelineError::invalid_dimensions(
                width.min(i64::MAX as u64) as i64,
                height.min(i64::MAX as u64) as i64,
                reason,
            )
        };

        if width > self.max_width as u64 {
            return Err(too_large(format!("width exceeds the limit of {}", self.max_width)));
        }
        if height > self.max_height as u64 {
            return Err(too_large(format!("height exceeds the limit of {}", self.max_height)));
        }
        if width * height > self.max_pixels {
            return Err(too_large(format!(
                "{} pixels exceeds the limit of {}",
                width * height,
                self.max_pixels
            )));
        }
        Ok(())
    }

    pub fn check_font_size(&self, size: u32) -> Result<(), PipelineError> {
        if size > self.max_font_size {
            return Err(PipelineError::malformed_parameter(
                "watermark",
                format!("size_{}", size),
                format!("font size exceeds the limit of {}", self.max_font_size),
            ));
        }
        Ok(())
    }
}
