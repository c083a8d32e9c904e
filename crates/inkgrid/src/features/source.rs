//! Bitmap sources: where occurrence crops are loaded and decoded from.

use crate::core::io::read_file_async;
use crate::{InkgridError, Result};
use ahash::AHashMap;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Loads and decodes the cropped bitmap of an occurrence.
///
/// Decoding is delegated to the implementation so hosts can plug in their
/// own image loading. Each call is a suspension point of the computation.
#[async_trait]
pub trait BitmapSource: Send + Sync {
    /// Decode the bitmap stored under `file` (the occurrence's `file` field).
    async fn load(&self, file: &str) -> Result<DynamicImage>;
}

/// Reads bitmaps from disk, relative to the index resource's directory.
#[derive(Debug, Clone)]
pub struct FsBitmapSource {
    base_dir: PathBuf,
}

impl FsBitmapSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl BitmapSource for FsBitmapSource {
    async fn load(&self, file: &str) -> Result<DynamicImage> {
        let path = self.base_dir.join(file);
        let bytes = read_file_async(&path).await?;
        image::load_from_memory(&bytes).map_err(|e| {
            InkgridError::image_processing_with_source(format!("Failed to decode bitmap {}", path.display()), e)
        })
    }
}

/// Bitmaps already decoded by the host, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct MemoryBitmapSource {
    images: AHashMap<String, DynamicImage>,
}

impl MemoryBitmapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: impl Into<String>, image: DynamicImage) {
        self.images.insert(file.into(), image);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[async_trait]
impl BitmapSource for MemoryBitmapSource {
    async fn load(&self, file: &str) -> Result<DynamicImage> {
        self.images
            .get(file)
            .cloned()
            .ok_or_else(|| InkgridError::image_processing(format!("No bitmap registered for {}", file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fs_source_decodes_png() {
        let dir = tempdir().unwrap();
        GrayImage::from_pixel(8, 8, Luma([40]))
            .save(dir.path().join("g_0001.png"))
            .unwrap();

        let source = FsBitmapSource::new(dir.path());
        let image = source.load("g_0001.png").await.unwrap();
        assert_eq!(image.width(), 8);
        assert_eq!(image.height(), 8);
    }

    #[tokio::test]
    async fn test_fs_source_reports_undecodable_bitmap() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not an image").unwrap();

        let source = FsBitmapSource::new(dir.path());
        let err = source.load("broken.png").await.unwrap_err();
        assert!(matches!(err, InkgridError::ImageProcessing { .. }));
    }

    #[tokio::test]
    async fn test_fs_source_missing_bitmap_is_io_error() {
        let dir = tempdir().unwrap();
        let source = FsBitmapSource::new(dir.path());
        let err = source.load("missing.png").await.unwrap_err();
        assert!(matches!(err, InkgridError::Io(_)));
    }

    #[tokio::test]
    async fn test_memory_source() {
        let mut source = MemoryBitmapSource::new();
        source.insert("a.png", DynamicImage::ImageLuma8(GrayImage::new(4, 4)));
        assert_eq!(source.len(), 1);
        assert!(source.load("a.png").await.is_ok());
        assert!(source.load("b.png").await.is_err());
    }
}
