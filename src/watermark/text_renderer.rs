//! Text watermark rendering.
//!
//! Renders a string into a tightly fitted transparent RGBA buffer that the
//! compositor can paste onto a layer.
//!
//! # Features
//!
//! - Hex color parsing (`RGB` / `RRGGBB`, optional `#`)
//! - Point size and alpha per watermark
//! - Counter-clockwise rotation with an expanding buffer
//! - Embedded default font, or a font file chosen at startup
//!
//! # Example
//!
//! ```ignore
//! use imgpipe::watermark::text_renderer::{parse_hex_color, render_text, FontSource, TextRenderOptions};
//!
//! let font = FontSource::embedded()?;
//! let options = TextRenderOptions {
//!     text: "Hello World".to_string(),
//!     font_size: 30.0,
//!     color: parse_hex_color("222222")?,
//!     alpha: 178,
//!     rotation_degrees: 30.0,
//! };
//! let image = render_text(&font, &options)?;
//! ```

use super::WatermarkError;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::OnceLock;

/// Embedded font data (DejaVu Sans Mono, free license).
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSansMono.ttf");

static EMBEDDED_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

/// A loaded font ready for rendering. Cheap to clone.
#[derive(Clone)]
pub struct FontSource {
    font: FontArc,
}

impl std::fmt::Debug for FontSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSource")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}

impl FontSource {
    /// The font compiled into the binary.
    pub fn embedded() -> Result<Self, WatermarkError> {
        EMBEDDED_FONT
            .get_or_init(|| FontArc::try_from_slice(EMBEDDED_FONT_DATA).ok())
            .clone()
            .map(|font| Self { font })
            .ok_or_else(|| WatermarkError::FontError("embedded font is invalid".to_string()))
    }

    /// Load a TrueType/OpenType font file.
    pub fn from_file(path: &Path) -> Result<Self, WatermarkError> {
        let data = std::fs::read(path)
            .map_err(|e| WatermarkError::FontError(format!("{}: {}", path.display(), e)))?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| WatermarkError::FontError(format!("{}: {}", path.display(), e)))?;
        Ok(Self { font })
    }

    /// Use `path` when configured, the embedded font otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Self, WatermarkError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }

    pub fn font(&self) -> &FontArc {
        &self.font
    }
}

/// RGB fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255)
    }
}

/// Options for text rendering.
#[derive(Debug, Clone)]
pub struct TextRenderOptions {
    /// The text to render (already decoded).
    pub text: String,
    /// Font size in pixels.
    pub font_size: f32,
    /// Fill color.
    pub color: Color,
    /// Fill alpha (0-255).
    pub alpha: u8,
    /// Counter-clockwise rotation in degrees. Only values > 0 rotate.
    pub rotation_degrees: f32,
}

/// Parse a hex color with or without a leading `#`.
///
/// Supports `RGB` and `RRGGBB`.
pub fn parse_hex_color(hex: &str) -> Result<Color, WatermarkError> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    let digit = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| WatermarkError::RenderError(format!("Invalid hex color digits: {}", s)))
    };

    match hex.len() {
        3 => {
            // Double each component: 0xF -> 0xFF, 0xA -> 0xAA
            let r = digit(&hex[0..1])?;
            let g = digit(&hex[1..2])?;
            let b = digit(&hex[2..3])?;
            Ok(Color::new(r * 17, g * 17, b * 17))
        }
        6 => Ok(Color::new(
            digit(&hex[0..2])?,
            digit(&hex[2..4])?,
            digit(&hex[4..6])?,
        )),
        _ => Err(WatermarkError::RenderError(format!(
            "Color must be RGB or RRGGBB, got {} characters",
            hex.len()
        ))),
    }
}

/// Dimensions of rendered text as (width, height) in pixels.
pub fn measure_text(font: &FontSource, text: &str, font_size: f32) -> (u32, u32) {
    let scaled_font = font.font.as_scaled(PxScale::from(font_size));

    let mut width = 0.0f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;
    for c in text.chars() {
        let glyph_id = scaled_font.glyph_id(c);
        if let Some(prev) = prev_glyph {
            width += scaled_font.kern(prev, glyph_id);
        }
        width += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    // Small padding for antialiased edges
    let padding = 2;
    (
        (width.ceil() as u32).saturating_add(padding),
        (scaled_font.height().ceil() as u32).saturating_add(padding),
    )
}

/// Render text to a transparent RGBA buffer.
pub fn render_text(
    font: &FontSource,
    options: &TextRenderOptions,
) -> Result<RgbaImage, WatermarkError> {
    if options.text.is_empty() {
        return Err(WatermarkError::RenderError(
            "Cannot render empty text".to_string(),
        ));
    }
    if options.font_size.is_nan() || options.font_size <= 0.0 {
        return Err(WatermarkError::RenderError(format!(
            "Font size must be positive, got {}",
            options.font_size
        )));
    }

    let scale = PxScale::from(options.font_size);
    let scaled_font = font.font.as_scaled(scale);
    let (width, height) = measure_text(font, &options.text, options.font_size);

    let mut image = RgbaImage::new(width.max(1), height.max(1));
    let baseline_y = scaled_font.ascent();

    let mut cursor_x = 0.0f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;
    for c in options.text.chars() {
        let glyph_id = scaled_font.glyph_id(c);
        if let Some(prev) = prev_glyph {
            cursor_x += scaled_font.kern(prev, glyph_id);
        }

        let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline_y));
        if let Some(outlined) = font.font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                let x = px as i32 + bounds.min.x as i32;
                let y = py as i32 + bounds.min.y as i32;
                if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
                    return;
                }
                let pixel = Rgba([
                    options.color.r,
                    options.color.g,
                    options.color.b,
                    (coverage.clamp(0.0, 1.0) * options.alpha as f32) as u8,
                ]);
                let existing = *image.get_pixel(x as u32, y as u32);
                image.put_pixel(x as u32, y as u32, blend_over(existing, pixel));
            });
        }

        cursor_x += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    if options.rotation_degrees > 0.0 {
        image = rotate_expand(&image, options.rotation_degrees);
    }

    Ok(image)
}

/// Porter-Duff "over" for overlapping glyph coverage.
fn blend_over(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = top[3] as f32 / 255.0;
    let bottom_alpha = bottom[3] as f32 / 255.0;
    let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |t: u8, b: u8| -> u8 {
        let result = (t as f32 * top_alpha + b as f32 * bottom_alpha * (1.0 - top_alpha)) / out_alpha;
        result.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend(top[0], bottom[0]),
        blend(top[1], bottom[1]),
        blend(top[2], bottom[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}

/// Rotate counter-clockwise by `degrees`, growing the buffer to fit.
///
/// Uncovered corners stay transparent.
pub fn rotate_expand(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();

    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    // Tolerance keeps float noise at right angles from adding a pixel
    let dst_w = ((src_w * cos.abs() + src_h * sin.abs() - 1e-3).ceil() as u32).max(1);
    let dst_h = ((src_w * sin.abs() + src_h * cos.abs() - 1e-3).ceil() as u32).max(1);

    let src_cx = src_w / 2.0;
    let src_cy = src_h / 2.0;
    let dst_cx = dst_w as f32 / 2.0;
    let dst_cy = dst_h as f32 / 2.0;

    let mut rotated = RgbaImage::new(dst_w, dst_h);
    for (dx, dy, pixel) in rotated.enumerate_pixels_mut() {
        // Map destination pixel centers back into the source (y axis points down)
        let rx = dx as f32 + 0.5 - dst_cx;
        let ry = dy as f32 + 0.5 - dst_cy;
        let sx = rx * cos - ry * sin + src_cx - 0.5;
        let sy = rx * sin + ry * cos + src_cy - 0.5;
        *pixel = sample_bilinear(image, sx, sy);
    }

    rotated
}

fn sample_bilinear(image: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |px: f32, py: f32| -> [f32; 4] {
        if px < 0.0 || py < 0.0 || px >= image.width() as f32 || py >= image.height() as f32 {
            return [0.0; 4];
        }
        let p = image.get_pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1.0, y0);
    let p01 = fetch(x0, y0 + 1.0);
    let p11 = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 4];
    for (c, slot) in out.iter_mut().enumerate() {
        let v = p00[c] * (1.0 - fx) * (1.0 - fy)
            + p10[c] * fx * (1.0 - fy)
            + p01[c] * (1.0 - fx) * fy
            + p11[c] * fx * fy;
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
