//! Image decode and encode
//!
//! Provides a trait-based encoder system:
//! - One encoder per output format
//! - Output format chosen from the target key, then the source format
//! - Quality honored by lossy encoders only

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

use super::quality::Quality;
use crate::error::PipelineError;

/// A decoded source image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: RgbaImage,
    pub format: ImageFormat,
}

/// Decode image bytes, guessing the format from content.
pub fn decode_image(data: &[u8]) -> Result<DecodedImage, PipelineError> {
    let format = image::guess_format(data).map_err(|e| PipelineError::decode(e.to_string()))?;
    let image = image::load_from_memory_with_format(data, format)
        .map_err(|e| PipelineError::decode(e.to_string()))?;

    Ok(DecodedImage {
        pixels: image.to_rgba8(),
        format,
    })
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
}

impl OutputFormat {
    /// Parse format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            "gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::WebP),
            ImageFormat::Gif => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    /// Format for an object key: its extension, else the source format, else JPEG.
    pub fn resolve(key: &str, source: Option<ImageFormat>) -> Self {
        let from_key = key
            .rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.contains('/'))
            .and_then(|(_, ext)| Self::from_extension(ext));

        from_key
            .or_else(|| source.and_then(Self::from_image_format))
            .unwrap_or(OutputFormat::Jpeg)
    }

    /// Get the MIME content type for this format
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Gif => "image/gif",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Gif => "gif",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for image encoders
pub trait ImageEncoder: Send + Sync {
    /// The output format this encoder produces
    fn format(&self) -> OutputFormat;

    /// Encode an RGBA canvas. `quality` is already clamped to 1..=100.
    fn encode(&self, image: &RgbaImage, quality: u8) -> Result<Vec<u8>, PipelineError>;

    /// Whether the alpha channel survives encoding
    fn supports_transparency(&self) -> bool;
}

/// JPEG encoder. Drops the alpha channel.
pub struct JpegEncoder;

impl ImageEncoder for JpegEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Jpeg
    }

    fn encode(&self, image: &RgbaImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
        use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
        use image::ImageEncoder as _;

        let rgb_data = rgba_to_rgb(image.as_raw());

        let mut output = Cursor::new(Vec::new());
        ImageJpegEncoder::new_with_quality(&mut output, quality)
            .write_image(&rgb_data, image.width(), image.height(), image::ColorType::Rgb8)
            .map_err(|e| PipelineError::encode("jpeg", e.to_string()))?;

        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        false
    }
}

pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }

    fn encode(&self, image: &RgbaImage, _quality: u8) -> Result<Vec<u8>, PipelineError> {
        use image::codecs::png::PngEncoder as ImagePngEncoder;
        use image::ImageEncoder as _;

        let mut output = Cursor::new(Vec::new());
        ImagePngEncoder::new(&mut output)
            .write_image(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)
            .map_err(|e| PipelineError::encode("png", e.to_string()))?;

        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Lossless WebP encoder (the `image` crate has no lossy WebP encoder)
pub struct WebPEncoder;

impl ImageEncoder for WebPEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::WebP
    }

    fn encode(&self, image: &RgbaImage, _quality: u8) -> Result<Vec<u8>, PipelineError> {
        use image::codecs::webp::WebPEncoder as ImageWebPEncoder;
        use image::ImageEncoder as _;

        let mut output = Cursor::new(Vec::new());
        ImageWebPEncoder::new_lossless(&mut output)
            .write_image(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)
            .map_err(|e| PipelineError::encode("webp", e.to_string()))?;

        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Single-frame GIF encoder
pub struct GifEncoder;

impl ImageEncoder for GifEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Gif
    }

    fn encode(&self, image: &RgbaImage, _quality: u8) -> Result<Vec<u8>, PipelineError> {
        use image::codecs::gif::GifEncoder as ImageGifEncoder;

        let mut output = Vec::new();
        {
            let mut encoder = ImageGifEncoder::new(&mut output);
            encoder
                .encode_frame(image::Frame::new(image.clone()))
                .map_err(|e| PipelineError::encode("gif", e.to_string()))?;
        }

        Ok(output)
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Factory for creating encoders based on output format
pub struct EncoderFactory;

impl EncoderFactory {
    pub fn create(format: OutputFormat) -> Box<dyn ImageEncoder> {
        match format {
            OutputFormat::Jpeg => Box::new(JpegEncoder),
            OutputFormat::Png => Box::new(PngEncoder),
            OutputFormat::WebP => Box::new(WebPEncoder),
            OutputFormat::Gif => Box::new(GifEncoder),
        }
    }
}

/// Encode `canvas` as `format` with the accumulated quality.
pub fn encode(
    canvas: &RgbaImage,
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<u8>, PipelineError> {
    if !quality.is_in_range() {
        tracing::warn!(
            quality = quality.value(),
            clamped = quality.clamped(),
            format = %format,
            "Quality out of range, clamping"
        );
    }

    EncoderFactory::create(format).encode(canvas, quality.clamped())
}

/// Convert RGBA to RGB by discarding alpha channel
fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for chunk in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&chunk[..3]);
    }
    rgb
}
