//! Feature extraction: bitmap to fixed-length standardized descriptor.
//!
//! A bitmap is downsampled (bilinear) to a square grid, each cell reduced to
//! luminance with ITU-R BT.601 weights scaled to `[0, 1]`, and the resulting
//! vector standardized against its own mean and population standard
//! deviation. Uniform bitmaps have no deviation beyond rounding noise and map
//! to the zero vector.
//!
//! Extraction is the dominant cost of analysis, so vectors are memoized per
//! bitmap for the lifetime of the owning session. The memo is append-only:
//! a bitmap published under a file name never changes within a session.

mod source;

pub use source::{BitmapSource, FsBitmapSource, MemoryBitmapSource};

use crate::Result;
use crate::types::{FeatureVector, Occurrence};
use dashmap::DashMap;
use image::DynamicImage;
use image::imageops::FilterType;

const LUMA_R: f64 = 0.299;
const LUMA_G: f64 = 0.587;
const LUMA_B: f64 = 0.114;

/// Compute the feature vector of one decoded bitmap.
///
/// Deterministic: the same bitmap and grid size always yield the same vector.
pub fn extract_features(image: &DynamicImage, grid_size: u32) -> FeatureVector {
    let cells = image.resize_exact(grid_size, grid_size, FilterType::Triangle).to_rgb8();

    let luminance: Vec<f64> = cells
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0;
            (LUMA_R * f64::from(r) + LUMA_G * f64::from(g) + LUMA_B * f64::from(b)) / 255.0
        })
        .collect();

    FeatureVector::new(grid_size, standardize(luminance))
}

/// Relative deviation below which a vector counts as uniform.
const UNIFORM_TOLERANCE: f64 = 1e-12;

/// Subtract the mean and divide by the population standard deviation.
///
/// Uniform input yields all zeros. The mean of identical values can sit a
/// few ULP off each value, so the deviation is compared against a tolerance
/// relative to the mean rather than against zero.
pub fn standardize(mut values: Vec<f64>) -> Vec<f64> {
    if values.is_empty() {
        return values;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if !std_dev.is_finite() || std_dev <= UNIFORM_TOLERANCE * mean.abs().max(1.0) {
        values.fill(0.0);
        return values;
    }

    for v in &mut values {
        *v = (*v - mean) / std_dev;
    }
    values
}

/// Feature extractor with a session-scoped, append-only memo.
pub struct FeatureExtractor {
    grid_size: u32,
    memo: DashMap<String, FeatureVector>,
}

impl FeatureExtractor {
    pub fn new(grid_size: u32) -> Self {
        Self {
            grid_size,
            memo: DashMap::new(),
        }
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Vector for `occurrence`, decoding its bitmap through `source` on a memo miss.
    ///
    /// # Errors
    ///
    /// Returns the source's error when the bitmap cannot be loaded or decoded.
    /// Failures are not memoized.
    pub async fn vector_for(&self, source: &dyn BitmapSource, occurrence: &Occurrence) -> Result<FeatureVector> {
        if let Some(vector) = self.memoized(&occurrence.file) {
            return Ok(vector);
        }

        let image = source.load(&occurrence.file).await?;
        let vector = extract_features(&image, self.grid_size);
        Ok(self.remember(&occurrence.file, vector))
    }

    /// Previously computed vector for a bitmap file, if any.
    pub fn memoized(&self, file: &str) -> Option<FeatureVector> {
        self.memo.get(file).map(|entry| entry.value().clone())
    }

    /// Store `vector` unless a vector is already memoized for `file`.
    ///
    /// Returns the memoized vector, which is the existing one when present.
    pub fn remember(&self, file: &str, vector: FeatureVector) -> FeatureVector {
        self.memo.entry(file.to_string()).or_insert(vector).value().clone()
    }

    /// Number of memoized vectors.
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }
}
