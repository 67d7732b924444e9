//! Watermark operation binding.
//!
//! Turns the raw parameters of one `watermark` segment into a `WatermarkSpec`
//! once, with every default applied and every value validated. Whether the
//! watermark is text or an image is decided here, not at render time.
//!
//! | key      | meaning                                   | default      |
//! |----------|-------------------------------------------|--------------|
//! | `text`   | base64 text                               |              |
//! | `image`  | base64 `bucket/key` of the watermark image |              |
//! | `type`   | base64 font name (informational)          | `wqy-zenhei` |
//! | `size`   | font size in pixels                       | 40           |
//! | `color`  | hex RGB                                   | `FFFFFF`     |
//! | `t`      | text opacity percent 0-100                | 0            |
//! | `g`      | anchor code                               | `se`         |
//! | `x`, `y` | offsets from the anchor                   | 0            |
//! | `rotate` | counter-clockwise degrees                 | 0            |
//! | `shadow` | shadow opacity 0-100, `0` disables it     |              |
//! | `sr`     | shadow blur radius                        | 5            |
//! | `sx`,`sy`| shadow offset                             | 10           |

use super::compositor::Shadow;
use super::position::Anchor;
use super::text_renderer::{parse_hex_color, Color};
use crate::error::PipelineError;
use crate::pipeline::params::Params;
use crate::pipeline::parser::Operation;
use crate::storage::ObjectLocator;

pub const DEFAULT_FONT_NAME: &str = "wqy-zenhei";
pub const DEFAULT_FONT_SIZE: u32 = 40;
pub const DEFAULT_COLOR: &str = "FFFFFF";
pub const DEFAULT_OPACITY_PERCENT: f64 = 0.0;

/// Text watermark content.
#[derive(Debug, Clone, PartialEq)]
pub struct TextWatermark {
    /// Decoded text.
    pub content: String,
    /// Requested font name. Rendering always uses the configured font.
    pub font: String,
    pub size: u32,
    pub color: Color,
    /// Fill alpha derived from `t`.
    pub alpha: u8,
    pub rotate: i32,
}

/// Image watermark content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageWatermark {
    pub locator: ObjectLocator,
}

/// Text or image, decided at bind time.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkContent {
    Text(TextWatermark),
    Image(ImageWatermark),
}

/// Fully bound watermark operation.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    pub content: WatermarkContent,
    pub anchor: Anchor,
    pub offset_x: i32,
    pub offset_y: i32,
    pub shadow: Shadow,
    /// Raw `shadow` opacity when given. Only its zero-ness is used.
    pub shadow_opacity: Option<u8>,
}

impl WatermarkSpec {
    pub fn from_operation(operation: &Operation) -> Result<Self, PipelineError> {
        Self::from_params(Params::new(operation))
    }

    pub fn from_params(params: Params<'_>) -> Result<Self, PipelineError> {
        let content = if params.contains("image") {
            WatermarkContent::Image(bind_image(&params)?)
        } else {
            WatermarkContent::Text(bind_text(&params)?)
        };

        let anchor = params
            .raw("g")
            .map(Anchor::from_code)
            .unwrap_or_default();
        let offset_x = params.parse_or("x", 0)?;
        let offset_y = params.parse_or("y", 0)?;

        let shadow_opacity = params
            .parse::<f64>("shadow")?
            .map(|_| params.ranged_or("shadow", 0.0, 0.0, 100.0))
            .transpose()?
            .map(|value| value as u8);

        let defaults = Shadow::default();
        let blur_radius = match shadow_opacity {
            Some(0) => 0.0,
            _ => params.ranged_or("sr", defaults.blur_radius as f64, 0.0, 100.0)? as f32,
        };
        let shadow = Shadow {
            blur_radius,
            offset_x: params.parse_or("sx", defaults.offset_x)?,
            offset_y: params.parse_or("sy", defaults.offset_y)?,
        };

        Ok(Self {
            content,
            anchor,
            offset_x,
            offset_y,
            shadow,
            shadow_opacity,
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.content, WatermarkContent::Text(_))
    }
}

fn bind_text(params: &Params<'_>) -> Result<TextWatermark, PipelineError> {
    let content = params.base64_text("text")?.unwrap_or_default();
    if content.is_empty() {
        return Err(PipelineError::malformed_parameter(
            "watermark",
            "text",
            "text watermark needs a non-empty base64 'text' or an 'image'",
        ));
    }

    let font = params
        .base64_text("type")?
        .unwrap_or_else(|| DEFAULT_FONT_NAME.to_string());

    let size: u32 = params.parse_or("size", DEFAULT_FONT_SIZE)?;
    if size == 0 {
        return Err(PipelineError::malformed_parameter(
            "watermark",
            "size_0",
            "font size must be positive",
        ));
    }

    let raw_color = params.raw("color").unwrap_or(DEFAULT_COLOR);
    let color = parse_hex_color(raw_color).map_err(|e| {
        PipelineError::malformed_parameter("watermark", format!("color_{}", raw_color), e.to_string())
    })?;

    let opacity = params.ranged_or("t", DEFAULT_OPACITY_PERCENT, 0.0, 100.0)?;
    let alpha = (opacity / 100.0 * 255.0).floor() as u8;

    Ok(TextWatermark {
        content,
        font,
        size,
        color,
        alpha,
        rotate: params.parse_or("rotate", 0)?,
    })
}

fn bind_image(params: &Params<'_>) -> Result<ImageWatermark, PipelineError> {
    let locator_text = params.base64_text("image")?.unwrap_or_default();
    let locator = ObjectLocator::parse(&locator_text).ok_or_else(|| {
        PipelineError::malformed_parameter(
            "watermark",
            format!("image_{}", params.raw("image").unwrap_or_default()),
            "image must decode to 'bucket/key'",
        )
    })?;
    Ok(ImageWatermark { locator })
}
