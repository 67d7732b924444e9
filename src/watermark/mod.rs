//! Text and image watermarking.
//!
//! A `watermark` operation is bound once into a [`WatermarkSpec`], then applied
//! by the [`WatermarkProcessor`]:
//!
//! 1. materialize the content: render text, or fetch the image asset and
//!    halve it when it is wider than the canvas
//! 2. resolve the placement from the anchor and offsets
//! 3. composite the blurred shadow layer (when active), then the sharp layer
//!
//! # Operation Example
//!
//! ```text
//! image/watermark,text_SGVsbG8gV29ybGQ,size_30,color_FFFFFF,t_100,g_se,x_10,y_10
//! ```
//!
//! # Anchors
//!
//! `nw`, `north`, `ne`, `west`, `center`, `east`, `sw`, `south`, `se`.
//! Anything else falls back to `se`.

pub mod compositor;
pub mod config;
pub mod error;
pub mod image_fetcher;
pub mod position;
pub mod processor;
pub mod text_renderer;

// Re-export main types for convenience
pub use compositor::{composite_watermark, Layer, Shadow};
pub use config::{ImageWatermark, TextWatermark, WatermarkContent, WatermarkSpec};
pub use error::WatermarkError;
pub use image_fetcher::{AssetSource, CachedAsset, WatermarkAssetFetcher};
pub use position::{resolve, Anchor, AxisRule, Dimensions, Placement, PlacementRequest};
pub use processor::{fit_to_canvas, WatermarkProcessor};
pub use text_renderer::{
    measure_text, parse_hex_color, render_text, rotate_expand, Color, FontSource,
    TextRenderOptions,
};
