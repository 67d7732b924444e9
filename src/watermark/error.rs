use std::fmt;

/// Failures inside the watermark stage. Converted into `PipelineError` at the
/// stage boundary: fetch failures stay storage errors, the rest are render errors.
#[derive(Debug)]
pub enum WatermarkError {
    /// Asset could not be read from the object store or the staging directory
    FetchError(String),
    /// Asset bytes are not a supported image
    DecodeError(String),
    RenderError(String),
    FontError(String),
    /// Asset locator maps to an unusable staging path
    ConfigError(String),
}

impl fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchError(msg) => write!(f, "watermark asset unavailable: {}", msg),
            Self::DecodeError(msg) => write!(f, "watermark asset is not an image: {}", msg),
            Self::RenderError(msg) => write!(f, "text watermark render failed: {}", msg),
            Self::FontError(msg) => write!(f, "font load failed: {}", msg),
            Self::ConfigError(msg) => write!(f, "invalid watermark asset path: {}", msg),
        }
    }
}

impl std::error::Error for WatermarkError {}
