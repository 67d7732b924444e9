// Error types module

use std::fmt;

use crate::watermark::WatermarkError;

/// Centralized error type for the transformation pipeline
///
/// Splits failures into client input errors (never retried, user visible)
/// and environment errors (surfaced to the caller for its own retry policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    // === Grammar Errors ===
    /// Operation string does not start with the `image` segment
    MalformedPipeline { input: String },
    /// A parameter token has no `_` separator or a value cannot be coerced
    MalformedParameter {
        operation: String,
        token: String,
        reason: String,
    },
    /// Operation name outside the known set
    UnknownOperation { name: String },

    // === Stage Errors ===
    /// Resize target dimensions are not positive
    InvalidDimensions {
        width: i64,
        height: i64,
        reason: String,
    },
    /// Watermark asset, font, decode or blur failure
    WatermarkRender { message: String },
    /// Source object bytes could not be decoded as an image
    DecodeError { message: String },
    /// Resampler rejected the canvas buffers
    ResizeError { message: String },
    /// Final canvas could not be encoded
    EncodeError { format: String, message: String },

    // === Collaborator Errors ===
    /// Object storage fetch, upload or tag I/O failure
    StorageError { operation: String, message: String },
    /// The invocation envelope is missing or malformed
    InvalidRequest { message: String },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MalformedPipeline { input } => {
                write!(f, "Malformed pipeline '{}': must start with 'image'", input)
            }
            PipelineError::MalformedParameter {
                operation,
                token,
                reason,
            } => write!(
                f,
                "Malformed parameter '{}' in '{}': {}",
                token, operation, reason
            ),
            PipelineError::UnknownOperation { name } => {
                write!(f, "Unknown operation: {}", name)
            }
            PipelineError::InvalidDimensions {
                width,
                height,
                reason,
            } => write!(f, "Invalid dimensions {}x{}: {}", width, height, reason),
            PipelineError::WatermarkRender { message } => {
                write!(f, "Watermark render failed: {}", message)
            }
            PipelineError::DecodeError { message } => {
                write!(f, "Failed to decode source image: {}", message)
            }
            PipelineError::ResizeError { message } => {
                write!(f, "Resize failed: {}", message)
            }
            PipelineError::EncodeError { format, message } => {
                write!(f, "Failed to encode to {}: {}", format, message)
            }
            PipelineError::StorageError { operation, message } => {
                write!(f, "Storage {} failed: {}", operation, message)
            }
            PipelineError::InvalidRequest { message } => {
                write!(f, "Invalid request: {}", message)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    /// True for errors caused by the caller's input. These are never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedPipeline { .. }
                | PipelineError::MalformedParameter { .. }
                | PipelineError::UnknownOperation { .. }
                | PipelineError::InvalidDimensions { .. }
                | PipelineError::InvalidRequest { .. }
                | PipelineError::DecodeError { .. }
        )
    }

    /// True for environment failures the invoking collaborator may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::StorageError { .. } | PipelineError::EncodeError { .. }
        )
    }

    /// Maps pipeline errors to invocation status codes
    ///
    /// Status mapping:
    /// - MalformedPipeline, MalformedParameter, UnknownOperation,
    ///   InvalidDimensions, InvalidRequest → 400
    /// - DecodeError, WatermarkRender → 422
    /// - StorageError → 502
    /// - ResizeError, EncodeError → 500
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::MalformedPipeline { .. }
            | PipelineError::MalformedParameter { .. }
            | PipelineError::UnknownOperation { .. }
            | PipelineError::InvalidDimensions { .. }
            | PipelineError::InvalidRequest { .. } => 400,

            PipelineError::DecodeError { .. } | PipelineError::WatermarkRender { .. } => 422,

            PipelineError::StorageError { .. } => 502,

            PipelineError::ResizeError { .. } | PipelineError::EncodeError { .. } => 500,
        }
    }

    /// Short machine-readable message returned to the invoker.
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::MalformedPipeline { .. }
            | PipelineError::MalformedParameter { .. }
            | PipelineError::UnknownOperation { .. } => "invalid parameters",
            PipelineError::InvalidDimensions { .. } => "invalid dimensions",
            PipelineError::InvalidRequest { .. } => "invalid request",
            PipelineError::DecodeError { .. } => "undecodable image",
            PipelineError::WatermarkRender { .. } => "watermark render failed",
            PipelineError::StorageError { .. } => "storage error",
            PipelineError::ResizeError { .. } => "resize error",
            PipelineError::EncodeError { .. } => "encode error",
        }
    }

    /// Metric label for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MalformedPipeline { .. } => "malformed_pipeline",
            PipelineError::MalformedParameter { .. } => "malformed_parameter",
            PipelineError::UnknownOperation { .. } => "unknown_operation",
            PipelineError::InvalidDimensions { .. } => "invalid_dimensions",
            PipelineError::WatermarkRender { .. } => "watermark_render",
            PipelineError::DecodeError { .. } => "decode",
            PipelineError::ResizeError { .. } => "resize",
            PipelineError::EncodeError { .. } => "encode",
            PipelineError::StorageError { .. } => "storage",
            PipelineError::InvalidRequest { .. } => "invalid_request",
        }
    }

    // Helper constructors for common error patterns

    pub fn malformed_parameter(
        operation: impl Into<String>,
        token: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::MalformedParameter {
            operation: operation.into(),
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_dimensions(width: i64, height: i64, reason: impl Into<String>) -> Self {
        PipelineError::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::StorageError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        PipelineError::DecodeError {
            message: message.into(),
        }
    }

    pub fn resize(message: impl Into<String>) -> Self {
        PipelineError::ResizeError {
            message: message.into(),
        }
    }

    pub fn encode(format: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::EncodeError {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        PipelineError::InvalidRequest {
            message: message.into(),
        }
    }
}

impl From<WatermarkError> for PipelineError {
    fn from(err: WatermarkError) -> Self {
        match err {
            // Asset I/O against the object store stays a storage failure
            WatermarkError::FetchError(message) => PipelineError::storage("watermark fetch", message),
            other => PipelineError::WatermarkRender {
                message: other.to_string(),
            },
        }
    }
}
