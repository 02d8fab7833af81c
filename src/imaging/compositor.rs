//! Logo overlay for finished images

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, info};

use super::ImageAsset;
use crate::constants::{LOGO_MARGIN_BOTTOM, LOGO_MARGIN_RIGHT, LOGO_WIDTH_FRACTION};

/// Errors while stamping the logo onto an image.
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    /// The watermark file couldn't be read
    #[error("Watermark {} is missing: {source}", path.display())]
    WatermarkMissing {
        /// Where we looked
        path: PathBuf,
        /// Why the read failed
        source: std::io::Error,
    },
    /// The watermark file isn't an image
    #[error("Watermark {} is not a valid image: {source}", path.display())]
    WatermarkCorrupt {
        /// Where we looked
        path: PathBuf,
        /// Decoder error
        source: image::ImageError,
    },
    /// The generated image couldn't be decoded
    #[error("Generated image could not be decoded: {0}")]
    Base(image::ImageError),
    /// The composited image couldn't be written
    #[error("Failed to encode composited image: {0}")]
    Encode(image::ImageError),
}

/// Where and how big the logo lands on a base image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Scaled logo width
    pub width: u32,
    /// Scaled logo height
    pub height: u32,
    /// Left edge, may be negative on tiny images
    pub x: i64,
    /// Top edge, may be negative on tiny images
    pub y: i64,
}

impl Placement {
    /// Scales the logo to 30% of the base width and pins it to the bottom-right
    /// corner, inset by the fixed margins.
    pub fn compute(base: (u32, u32), logo: (u32, u32)) -> Self {
        let (base_width, base_height) = base;
        let (logo_width, logo_height) = logo;
        let width = (f64::from(base_width) * LOGO_WIDTH_FRACTION) as u32;
        let height = if logo_width == 0 {
            0
        } else {
            (f64::from(logo_height) * (f64::from(width) / f64::from(logo_width))) as u32
        };
        Self {
            width,
            height,
            x: i64::from(base_width) - i64::from(width) - i64::from(LOGO_MARGIN_RIGHT),
            y: i64::from(base_height) - i64::from(height) - i64::from(LOGO_MARGIN_BOTTOM),
        }
    }
}

/// Stamps a watermark onto generated images.
///
/// The watermark is read from disk on first use and kept for the life of the
/// process.
#[derive(Debug)]
pub struct LogoCompositor {
    path: PathBuf,
    watermark: OnceLock<Arc<RgbaImage>>,
}

impl LogoCompositor {
    /// Compositor that lazily loads its watermark from `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            watermark: OnceLock::new(),
        }
    }

    /// Compositor around an already decoded watermark.
    pub fn from_image(watermark: RgbaImage) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Arc::new(watermark));
        Self {
            path: PathBuf::from("<memory>"),
            watermark: cell,
        }
    }

    /// Path the watermark is read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached watermark, loading it if this is the first call.
    pub fn watermark(&self) -> Result<Arc<RgbaImage>, CompositeError> {
        if let Some(watermark) = self.watermark.get() {
            return Ok(watermark.clone());
        }
        let bytes = std::fs::read(&self.path).map_err(|source| CompositeError::WatermarkMissing {
            path: self.path.clone(),
            source,
        })?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|source| CompositeError::WatermarkCorrupt {
                path: self.path.clone(),
                source,
            })?
            .to_rgba8();
        info!(
            "Loaded watermark {} ({}x{})",
            self.path.display(),
            decoded.width(),
            decoded.height()
        );
        Ok(self.watermark.get_or_init(|| Arc::new(decoded)).clone())
    }

    /// Overlays the watermark on `base` and returns the result as PNG. The
    /// canvas keeps the base image's dimensions.
    pub fn overlay(&self, base: &[u8]) -> Result<ImageAsset, CompositeError> {
        let watermark = self.watermark()?;
        let mut canvas = image::load_from_memory(base)
            .map_err(CompositeError::Base)?
            .to_rgba8();

        let placement = Placement::compute(canvas.dimensions(), watermark.dimensions());
        debug!(?placement, "Placing watermark");
        if placement.width > 0 && placement.height > 0 {
            let logo = imageops::resize(
                &*watermark,
                placement.width,
                placement.height,
                FilterType::Lanczos3,
            );
            imageops::overlay(&mut canvas, &logo, placement.x, placement.y);
        }

        let mut output = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut output, ImageFormat::Png)
            .map_err(CompositeError::Encode)?;
        Ok(ImageAsset::new(output.into_inner(), ImageFormat::Png))
    }
}
