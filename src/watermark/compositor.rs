//! Layer compositing for watermarks.
//!
//! A watermark is never drawn straight onto the base image. The content is
//! pasted onto a full-canvas transparent layer, and that layer is composited
//! onto the base using its own alpha channel as the mask:
//!
//! ```text
//! out = layer * a + base * (1 - a)      a = layer.alpha / 255
//! ```
//!
//! With a shadow, a second layer holding the same content shifted by the
//! shadow offset is Gaussian-blurred and composited first, so the soft shadow
//! only shows where the sharp watermark does not cover it.
//!
//! # Example
//!
//! ```ignore
//! use imgpipe::watermark::compositor::{composite_watermark, Shadow};
//!
//! let result = composite_watermark(&base, &content, placement, Some(Shadow::default()));
//! ```

use super::position::{Dimensions, Placement};
use image::{Rgba, RgbaImage};

/// Drop shadow parameters. Active only when `blur_radius > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub blur_radius: f32,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            blur_radius: 5.0,
            offset_x: 10,
            offset_y: 10,
        }
    }
}

impl Shadow {
    pub fn is_active(&self) -> bool {
        self.blur_radius > 0.0
    }
}

/// A transparent layer the size of the base canvas.
#[derive(Clone)]
pub struct Layer {
    pixels: RgbaImage,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("dimensions", &self.pixels.dimensions())
            .finish()
    }
}

impl Layer {
    /// Fully transparent layer.
    pub fn transparent(dims: Dimensions) -> Self {
        Self {
            pixels: RgbaImage::new(dims.width, dims.height),
        }
    }

    /// Copy `content` onto the layer with its top-left at `(x, y)`.
    ///
    /// Pixels are replaced, not blended. Parts outside the layer are cropped.
    pub fn paste(&mut self, content: &RgbaImage, x: i64, y: i64) {
        let layer_w = self.pixels.width() as i64;
        let layer_h = self.pixels.height() as i64;

        let x_start = x.max(0);
        let y_start = y.max(0);
        let x_end = (x + content.width() as i64).min(layer_w);
        let y_end = (y + content.height() as i64).min(layer_h);

        for ty in y_start..y_end {
            for tx in x_start..x_end {
                let pixel = *content.get_pixel((tx - x) as u32, (ty - y) as u32);
                self.pixels.put_pixel(tx as u32, ty as u32, pixel);
            }
        }
    }

    /// Gaussian blur with the given radius (standard deviation).
    pub fn blurred(&self, radius: f32) -> Self {
        Self {
            pixels: image::imageops::blur(&self.pixels, radius),
        }
    }

    /// Composite onto `base` using the layer's alpha channel as the mask.
    pub fn composite_onto(&self, base: &mut RgbaImage) {
        for (layer_pixel, base_pixel) in self.pixels.pixels().zip(base.pixels_mut()) {
            *base_pixel = mask_blend(*base_pixel, *layer_pixel);
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Linear interpolation of every channel, weighted by the layer's own alpha.
fn mask_blend(base: Rgba<u8>, layer: Rgba<u8>) -> Rgba<u8> {
    match layer[3] {
        0 => base,
        255 => layer,
        alpha => {
            let a = alpha as f32 / 255.0;
            let mix = |l: u8, b: u8| -> u8 {
                (l as f32 * a + b as f32 * (1.0 - a)).round().clamp(0.0, 255.0) as u8
            };
            Rgba([
                mix(layer[0], base[0]),
                mix(layer[1], base[1]),
                mix(layer[2], base[2]),
                mix(layer[3], base[3]),
            ])
        }
    }
}

/// Apply one watermark (and its optional shadow) to a copy of `base`.
///
/// `base` is left untouched, so a failure before this call never leaves a
/// partial watermark behind.
pub fn composite_watermark(
    base: &RgbaImage,
    content: &RgbaImage,
    placement: Placement,
    shadow: Option<Shadow>,
) -> RgbaImage {
    let dims = Dimensions::of(base);
    let (x, y) = placement.to_pixel();
    let mut result = base.clone();

    if let Some(shadow) = shadow.filter(Shadow::is_active) {
        let mut shadow_layer = Layer::transparent(dims);
        shadow_layer.paste(
            content,
            x + shadow.offset_x as i64,
            y + shadow.offset_y as i64,
        );
        shadow_layer
            .blurred(shadow.blur_radius)
            .composite_onto(&mut result);
    }

    let mut watermark_layer = Layer::transparent(dims);
    watermark_layer.paste(content, x, y);
    watermark_layer.composite_onto(&mut result);

    result
}
