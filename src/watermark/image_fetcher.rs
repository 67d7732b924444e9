//! Watermark image fetcher with local staging.
//!
//! Image watermarks live in object storage. Each asset is looked up in three
//! places, in order:
//!
//! 1. the in-process cache of decoded images (warm invocations)
//! 2. the staging directory, `<watermark_dir>/<bucket>/<key>`
//! 3. the object store, after which the bytes are staged for next time
//!
//! Staging is not locked. Two invocations missing the same asset both fetch
//! it; each writes a private temp file and renames it into place, so readers
//! only ever see whole files.

use super::WatermarkError;
use crate::config::{StagingDirs, WatermarkConfig};
use crate::metrics::PipelineMetrics;
use crate::storage::{ObjectLocator, ObjectStore};
use image::{ImageFormat, RgbaImage};
use moka::future::Cache;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Where an asset was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    Memory,
    Staged,
    Fetched,
}

impl AssetSource {
    pub fn as_label(&self) -> &'static str {
        match self {
            AssetSource::Memory => "memory",
            AssetSource::Staged => "staged",
            AssetSource::Fetched => "fetched",
        }
    }
}

/// A decoded watermark asset.
#[derive(Clone)]
pub struct CachedAsset {
    pub image: Arc<RgbaImage>,
    pub source: AssetSource,
}

impl std::fmt::Debug for CachedAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedAsset")
            .field("dimensions", &self.image.dimensions())
            .field("source", &self.source)
            .finish()
    }
}

/// Fetcher for image watermark assets.
#[derive(Clone)]
pub struct WatermarkAssetFetcher {
    staging_dir: PathBuf,
    cache: Cache<ObjectLocator, Arc<RgbaImage>>,
}

impl std::fmt::Debug for WatermarkAssetFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkAssetFetcher")
            .field("staging_dir", &self.staging_dir)
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl WatermarkAssetFetcher {
    pub fn new(staging: &StagingDirs, config: &WatermarkConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.asset_cache_entries)
            .time_to_live(Duration::from_secs(config.asset_cache_ttl_secs))
            .build();

        Self {
            staging_dir: staging.watermark_dir().to_path_buf(),
            cache,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Fetch and decode the asset at `locator`.
    pub async fn fetch(
        &self,
        locator: &ObjectLocator,
        store: &dyn ObjectStore,
    ) -> Result<CachedAsset, WatermarkError> {
        if let Some(image) = self.cache.get(locator).await {
            return Ok(self.found(image, AssetSource::Memory));
        }

        let path = self.staged_path(locator)?;

        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        let (data, source) = if exists {
            let data = tokio::fs::read(&path).await.map_err(|e| {
                WatermarkError::FetchError(format!("{}: {}", path.display(), e))
            })?;
            (data, AssetSource::Staged)
        } else {
            let data = store
                .get_object(locator)
                .await
                .map_err(|e| WatermarkError::FetchError(e.to_string()))?;
            stage_file(&path, &data).await?;
            (data.to_vec(), AssetSource::Fetched)
        };

        let image = Arc::new(decode_asset(&data, &locator.key)?);
        self.cache.insert(locator.clone(), image.clone()).await;

        tracing::debug!(
            asset = %locator,
            source = source.as_label(),
            width = image.width(),
            height = image.height(),
            "Watermark asset loaded"
        );

        Ok(self.found(image, source))
    }

    fn found(&self, image: Arc<RgbaImage>, source: AssetSource) -> CachedAsset {
        PipelineMetrics::global().record_asset(source.as_label());
        CachedAsset { image, source }
    }

    /// Local path of the staged copy of `locator`.
    ///
    /// Rejects bucket or key components that could escape the staging directory.
    pub fn staged_path(&self, locator: &ObjectLocator) -> Result<PathBuf, WatermarkError> {
        let mut path = self.staging_dir.clone();

        for part in std::iter::once(locator.bucket.as_str()).chain(locator.key.split('/')) {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(component)), None) => path.push(component),
                _ => {
                    return Err(WatermarkError::ConfigError(format!(
                        "asset locator '{}' has an unsafe path component '{}'",
                        locator, part
                    )))
                }
            }
        }

        Ok(path)
    }

    /// Number of decoded assets held in memory.
    pub fn cached_assets(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn clear_cache(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// Write the whole file next to its destination, then rename it into place.
async fn stage_file(path: &Path, data: &[u8]) -> Result<(), WatermarkError> {
    let io_error = |e: std::io::Error| WatermarkError::FetchError(format!("{}: {}", path.display(), e));

    let parent = path
        .parent()
        .ok_or_else(|| WatermarkError::ConfigError(format!("{} has no parent", path.display())))?;
    tokio::fs::create_dir_all(parent).await.map_err(io_error)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4()));

    tokio::fs::write(&temp, data).await.map_err(io_error)?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(io_error(e));
    }

    Ok(())
}

fn decode_asset(data: &[u8], key: &str) -> Result<RgbaImage, WatermarkError> {
    let format = detect_image_format(data, key)?;
    image::load_from_memory_with_format(data, format)
        .map(|image| image.to_rgba8())
        .map_err(|e| WatermarkError::DecodeError(format!("{}: {}", key, e)))
}

/// Detect image format from bytes or filename extension.
fn detect_image_format(data: &[u8], path: &str) -> Result<ImageFormat, WatermarkError> {
    if let Ok(format) = image::guess_format(data) {
        return Ok(format);
    }

    let ext = path
        .rsplit('.')
        .next()
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "gif" => Ok(ImageFormat::Gif),
        "webp" => Ok(ImageFormat::WebP),
        _ => Err(WatermarkError::DecodeError(format!(
            "Unsupported image format: {ext}"
        ))),
    }
}
