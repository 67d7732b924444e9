// Shared fixtures for the cross-module tests

use image::{ImageFormat, Rgba, RgbaImage};
use imgpipe::config::{StagingConfig, StagingDirs, WatermarkConfig};
use imgpipe::pipeline::PipelineExecutor;
use imgpipe::storage::MemoryObjectStore;
use imgpipe::watermark::WatermarkProcessor;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

pub fn encoded(image: RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let image = match format {
        ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(
            image::DynamicImage::ImageRgba8(image).to_rgb8(),
        ),
        _ => image::DynamicImage::ImageRgba8(image),
    };
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    encoded(
        RgbaImage::from_pixel(width, height, Rgba([40, 80, 160, 255])),
        ImageFormat::Jpeg,
    )
}

pub fn solid_png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
    encoded(RgbaImage::from_pixel(width, height, color), ImageFormat::Png)
}

pub fn staging(root: &Path) -> StagingDirs {
    StagingDirs::prepare(&StagingConfig {
        root: root.to_path_buf(),
        ..StagingConfig::default()
    })
    .unwrap()
}

pub fn executor(store: Arc<MemoryObjectStore>, root: &Path) -> PipelineExecutor {
    let watermarks =
        WatermarkProcessor::from_config(&WatermarkConfig::default(), &staging(root)).unwrap();
    PipelineExecutor::new(store, watermarks)
}

pub fn decode(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}
