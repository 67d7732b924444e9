//! Resize stage
//!
//! `w` and `h` are integer targets, missing means 0. In the default `lfit`
//! mode only one of them is honored exactly and the other is derived from the
//! source aspect ratio, so the result covers the `w` x `h` box rather than
//! fitting inside it. `fixed` resizes to exactly `w` x `h`.

use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use image::RgbaImage;
use std::num::NonZeroU32;

use crate::error::PipelineError;
use crate::pipeline::params::Params;

/// Aspect handling for a resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Preserve the source ratio
    #[default]
    Lfit,
    /// Exact target dimensions
    Fixed,
}

impl ResizeMode {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "lfit" => Some(ResizeMode::Lfit),
            "fixed" => Some(ResizeMode::Fixed),
            _ => None,
        }
    }

    pub fn preserves_ratio(&self) -> bool {
        matches!(self, ResizeMode::Lfit)
    }
}

/// Bound `resize` parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    pub width: i64,
    pub height: i64,
    pub mode: ResizeMode,
}

impl ResizeOptions {
    pub fn from_params(params: Params<'_>) -> Result<Self, PipelineError> {
        let width: i64 = params.parse_or("w", 0)?;
        let height: i64 = params.parse_or("h", 0)?;

        let mode = match params.raw("m") {
            None => ResizeMode::default(),
            Some(code) => ResizeMode::from_code(code).ok_or_else(|| {
                PipelineError::malformed_parameter(
                    "resize",
                    format!("m_{}", code),
                    "mode must be 'lfit' or 'fixed'",
                )
            })?,
        };

        if width < 0 || height < 0 {
            return Err(PipelineError::invalid_dimensions(
                width,
                height,
                "target dimensions cannot be negative",
            ));
        }
        if width == 0 && height == 0 {
            return Err(PipelineError::invalid_dimensions(
                width,
                height,
                "at least one of w or h must be positive",
            ));
        }

        Ok(Self {
            width,
            height,
            mode,
        })
    }
}

/// Final pixel dimensions for resizing a `source_width` x `source_height` image.
///
/// With ratio preservation: if `w / ratio > h` the height is derived as
/// `floor(w / ratio)`, otherwise the width is derived as `floor(h * ratio)`.
pub fn target_dimensions(
    source_width: u32,
    source_height: u32,
    options: &ResizeOptions,
) -> Result<(u32, u32), PipelineError> {
    let (width, height) = if options.mode.preserves_ratio() {
        if source_width == 0 || source_height == 0 {
            return Err(PipelineError::invalid_dimensions(
                source_width as i64,
                source_height as i64,
                "source image is empty",
            ));
        }
        let ratio = source_width as f64 / source_height as f64;
        let target_w = options.width as f64;
        let target_h = options.height as f64;

        if target_w / ratio > target_h {
            (options.width, (target_w / ratio).floor() as i64)
        } else {
            ((target_h * ratio).floor() as i64, options.height)
        }
    } else {
        (options.width, options.height)
    };

    if width < 1 || height < 1 || width > u32::MAX as i64 || height > u32::MAX as i64 {
        return Err(PipelineError::invalid_dimensions(
            width,
            height,
            if width < 1 || height < 1 {
                "resized image would be empty"
            } else {
                "resized dimensions out of range"
            },
        ));
    }

    Ok((width as u32, height as u32))
}

/// Bilinear resample of an RGBA canvas.
pub fn resize_rgba(
    canvas: &RgbaImage,
    target_w: u32,
    target_h: u32,
) -> Result<RgbaImage, PipelineError> {
    if canvas.dimensions() == (target_w, target_h) {
        return Ok(canvas.clone());
    }

    let invalid = |reason: &str| {
        PipelineError::invalid_dimensions(target_w as i64, target_h as i64, reason)
    };

    let src_width = NonZeroU32::new(canvas.width()).ok_or_else(|| invalid("source width is 0"))?;
    let src_height =
        NonZeroU32::new(canvas.height()).ok_or_else(|| invalid("source height is 0"))?;
    let dst_width = NonZeroU32::new(target_w).ok_or_else(|| invalid("target width is 0"))?;
    let dst_height = NonZeroU32::new(target_h).ok_or_else(|| invalid("target height is 0"))?;

    // The resampler computes width * height in u32 without overflow checks
    target_w
        .checked_mul(target_h)
        .and_then(|pixels| (pixels as usize).checked_mul(4))
        .filter(|&len| len <= isize::MAX as usize)
        .ok_or_else(|| invalid("target buffer size overflows"))?;

    let src_image = Image::from_vec_u8(
        src_width,
        src_height,
        canvas.as_raw().clone(),
        PixelType::U8x4,
    )
    .map_err(|e| PipelineError::resize(format!("source buffer: {:?}", e)))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);

    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Bilinear));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| PipelineError::resize(format!("{:?}", e)))?;

    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| PipelineError::resize("output buffer size mismatch"))
}
