//! Watermark stage.
//!
//! Materializes the watermark content (rendered text or a fetched image),
//! resolves its placement and composites it, shadow first, onto a copy of the
//! canvas. The canvas passed in is never modified.

use super::compositor::composite_watermark;
use super::config::{ImageWatermark, TextWatermark, WatermarkContent, WatermarkSpec};
use super::image_fetcher::WatermarkAssetFetcher;
use super::position::{resolve, Dimensions};
use super::text_renderer::{measure_text, render_text, FontSource, TextRenderOptions};
use super::WatermarkError;
use crate::config::{LimitsConfig, StagingDirs, WatermarkConfig};
use crate::error::PipelineError;
use crate::storage::ObjectStore;
use crate::transform::resize_rgba;
use image::RgbaImage;

/// Applies bound watermark operations to a canvas.
#[derive(Debug, Clone)]
pub struct WatermarkProcessor {
    font: FontSource,
    fetcher: WatermarkAssetFetcher,
    limits: LimitsConfig,
}

impl WatermarkProcessor {
    pub fn new(font: FontSource, fetcher: WatermarkAssetFetcher) -> Self {
        Self {
            font,
            fetcher,
            limits: LimitsConfig::default(),
        }
    }

    /// Replace the default size limits applied to rendered text.
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Build from configuration, loading the configured font or the embedded one.
    pub fn from_config(
        config: &WatermarkConfig,
        staging: &StagingDirs,
    ) -> Result<Self, WatermarkError> {
        let font = FontSource::resolve(config.font_path.as_deref())?;
        Ok(Self::new(font, WatermarkAssetFetcher::new(staging, config)))
    }

    pub fn fetcher(&self) -> &WatermarkAssetFetcher {
        &self.fetcher
    }

    /// Apply one watermark to a copy of `canvas`.
    pub async fn apply(
        &self,
        canvas: &RgbaImage,
        spec: &WatermarkSpec,
        store: &dyn ObjectStore,
    ) -> Result<RgbaImage, PipelineError> {
        let content = match &spec.content {
            WatermarkContent::Text(text) => self.render(text)?,
            WatermarkContent::Image(image) => self.load_image(canvas, image, store).await?,
        };

        let placement = resolve(
            Dimensions::of(canvas),
            Dimensions::of(&content),
            spec.anchor,
            spec.offset_x,
            spec.offset_y,
        );

        tracing::debug!(
            anchor = %spec.anchor,
            x = placement.x,
            y = placement.y,
            width = content.width(),
            height = content.height(),
            shadow = spec.shadow.is_active(),
            "Compositing watermark"
        );

        Ok(composite_watermark(
            canvas,
            &content,
            placement,
            Some(spec.shadow),
        ))
    }

    fn render(&self, text: &TextWatermark) -> Result<RgbaImage, PipelineError> {
        self.limits.check_font_size(text.size)?;
        let (width, height) = text_extent(&self.font, text);
        self.limits.check_dimensions(width, height)?;

        let options = TextRenderOptions {
            text: text.content.clone(),
            font_size: text.size as f32,
            color: text.color,
            alpha: text.alpha,
            rotation_degrees: text.rotate as f32,
        };
        Ok(render_text(&self.font, &options)?)
    }

    async fn load_image(
        &self,
        canvas: &RgbaImage,
        image: &ImageWatermark,
        store: &dyn ObjectStore,
    ) -> Result<RgbaImage, PipelineError> {
        let asset = self.fetcher.fetch(&image.locator, store).await?;
        fit_to_canvas(canvas.width(), asset.image.as_ref())
    }
}

/// Upper bound of the buffer a text watermark renders into. A rotated
/// buffer never exceeds the diagonal of the unrotated one on either side.
fn text_extent(font: &FontSource, text: &TextWatermark) -> (u64, u64) {
    let (width, height) = measure_text(font, &text.content, text.size as f32);
    if text.rotate > 0 {
        let diagonal = (width as f64).hypot(height as f64).ceil() as u64 + 1;
        (diagonal, diagonal)
    } else {
        (width as u64, height as u64)
    }
}

/// Halve a watermark that is wider than the canvas it goes on.
///
/// Only one halving is applied; the result may still be wider than the canvas.
pub fn fit_to_canvas(canvas_width: u32, watermark: &RgbaImage) -> Result<RgbaImage, PipelineError> {
    if canvas_width >= watermark.width() {
        return Ok(watermark.clone());
    }

    let width = (watermark.width() / 2).max(1);
    let height = (watermark.height() / 2).max(1);
    resize_rgba(watermark, width, height)
}
