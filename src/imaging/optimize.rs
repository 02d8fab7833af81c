//! Shrinks and re-compresses uploads before they are sent to a provider.
//!
//! Provider calls are billed and timed on input size, so uploads are capped to
//! `max_dimension` on the long side and re-encoded as JPEG. The optimizer never
//! fails a request: when the upload can't be processed the original bytes are
//! handed on and the outcome says why.

use std::time::Instant;

use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageFormat};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ImageAsset;
use crate::constants::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};

/// Knobs for [`optimize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptimizeSettings {
    /// Longest allowed side in pixels.
    pub max_dimension: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Why an upload could not be optimized. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Couldn't read the upload
    #[error("decode failed: {0}")]
    Decode(image::ImageError),
    /// Couldn't write the JPEG
    #[error("encode failed: {0}")]
    Encode(image::ImageError),
}

/// Sizes and timings for one optimizer run. Times are in seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    /// Input size in bytes.
    pub original_size: usize,
    /// Output size in bytes.
    pub compressed_size: usize,
    /// Percentage saved, `(1 - compressed/original) * 100`.
    pub compression_ratio: f64,
    /// Time spent resizing.
    pub resize_time: f64,
    /// Time spent converting to RGB.
    pub convert_time: f64,
    /// Time spent encoding.
    pub compress_time: f64,
    /// Wall time of the whole run.
    pub compression_time: f64,
}

/// Result of [`optimize`].
#[derive(Clone, Debug)]
pub enum OptimizeOutcome {
    /// The upload was re-encoded.
    Optimized {
        /// JPEG output
        asset: ImageAsset,
        /// Sizes and timings
        stats: CompressionStats,
    },
    /// The upload is passed on untouched.
    PassThrough {
        /// The original upload
        asset: ImageAsset,
        /// Sizes and timings, with a zero ratio
        stats: CompressionStats,
        /// What went wrong
        reason: String,
    },
}

impl OptimizeOutcome {
    /// Stats for either outcome.
    pub fn stats(&self) -> &CompressionStats {
        match self {
            Self::Optimized { stats, .. } | Self::PassThrough { stats, .. } => stats,
        }
    }

    /// The failure reason, when the upload was passed through.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Optimized { .. } => None,
            Self::PassThrough { reason, .. } => Some(reason),
        }
    }

    /// The asset to carry on with.
    pub fn into_asset(self) -> ImageAsset {
        match self {
            Self::Optimized { asset, .. } | Self::PassThrough { asset, .. } => asset,
        }
    }
}

/// Target size for an image whose long side must not exceed `max_dimension`.
/// Returns `None` when no resize is needed.
pub(crate) fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max_dimension || max_dimension == 0 {
        return None;
    }
    let scale = f64::from(max_dimension) / f64::from(longest);
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_dimension);
    Some((scaled(width), scaled(height)))
}

fn ratio(original: usize, compressed: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - compressed as f64 / original as f64) * 100.0
}

fn run(
    asset: &ImageAsset,
    settings: OptimizeSettings,
    stats: &mut CompressionStats,
) -> Result<Vec<u8>, CompressionError> {
    let image = image::load_from_memory(asset.bytes()).map_err(CompressionError::Decode)?;
    debug!(
        width = image.width(),
        height = image.height(),
        bytes = asset.len(),
        "Optimizing upload"
    );

    let started = Instant::now();
    let image = match fit_within(image.width(), image.height(), settings.max_dimension) {
        Some((width, height)) => {
            debug!(width, height, "Resizing upload");
            image.resize_exact(width, height, FilterType::Lanczos3)
        }
        None => image,
    };
    stats.resize_time = started.elapsed().as_secs_f64();

    let started = Instant::now();
    let rgb = match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    };
    stats.convert_time = started.elapsed().as_secs_f64();

    let started = Instant::now();
    let mut output = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, settings.quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(CompressionError::Encode)?;
    stats.compress_time = started.elapsed().as_secs_f64();

    Ok(output)
}

/// Resizes and JPEG-compresses `asset`, falling back to the original bytes on
/// any failure.
pub fn optimize(asset: &ImageAsset, settings: OptimizeSettings) -> OptimizeOutcome {
    let started = Instant::now();
    let original_size = asset.len();
    let mut stats = CompressionStats {
        original_size,
        ..CompressionStats::default()
    };

    match run(asset, settings, &mut stats) {
        Ok(bytes) => {
            stats.compressed_size = bytes.len();
            stats.compression_ratio = ratio(original_size, bytes.len());
            stats.compression_time = started.elapsed().as_secs_f64();
            info!(
                original_size,
                compressed_size = stats.compressed_size,
                "Compressed upload by {:.1}% in {:.3}s",
                stats.compression_ratio,
                stats.compression_time
            );
            OptimizeOutcome::Optimized {
                asset: ImageAsset::new(bytes, ImageFormat::Jpeg),
                stats,
            }
        }
        Err(err) => {
            warn!("Image optimization failed, using original upload: {}", err);
            OptimizeOutcome::PassThrough {
                asset: asset.clone(),
                stats: CompressionStats {
                    original_size,
                    compressed_size: original_size,
                    compression_ratio: 0.0,
                    compression_time: started.elapsed().as_secs_f64(),
                    ..CompressionStats::default()
                },
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_images::{encode, jpeg, solid_rgba};

    #[test]
    fn large_jpeg_is_shrunk_and_smaller() {
        let original = ImageAsset::sniffed(jpeg(1024, 1024));

        let outcome = optimize(&original, OptimizeSettings::default());

        let OptimizeOutcome::Optimized { asset, stats } = outcome else {
            panic!("expected optimized output");
        };
        assert!(stats.compressed_size < stats.original_size);
        assert!(stats.compression_ratio > 0.0);
        assert!(stats.compression_time >= 0.0);
        assert_eq!(asset.format(), Some(ImageFormat::Jpeg));
        let decoded = image::load_from_memory(asset.bytes()).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (512, 512));
    }

    #[test]
    fn aspect_ratio_is_kept() {
        let original = ImageAsset::sniffed(jpeg(1200, 600));
        let asset = optimize(&original, OptimizeSettings::default()).into_asset();
        let decoded = image::load_from_memory(asset.bytes()).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (512, 256));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let png = encode(&solid_rgba(100, 60, [10, 200, 10, 128]), ImageFormat::Png);
        let outcome = optimize(&ImageAsset::sniffed(png), OptimizeSettings::default());
        assert!(outcome.reason().is_none());
        let decoded = image::load_from_memory(outcome.into_asset().bytes()).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (100, 60));
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn unreadable_upload_passes_through() {
        let original = ImageAsset::sniffed(b"fake-image-bytes".to_vec());

        let outcome = optimize(&original, OptimizeSettings::default());

        assert!(outcome.reason().is_some());
        let stats = outcome.stats().clone();
        assert_eq!(stats.compression_ratio, 0.0);
        assert_eq!(stats.compressed_size, stats.original_size);
        assert_eq!(outcome.into_asset(), original);
    }

    #[test]
    fn fit_within_rounds_short_side() {
        assert_eq!(fit_within(512, 512, 512), None);
        assert_eq!(fit_within(100, 2000, 512), Some((26, 512)));
        assert_eq!(fit_within(4000, 3, 512), Some((512, 1)));
        assert_eq!(fit_within(10, 10, 0), None);
    }
}
