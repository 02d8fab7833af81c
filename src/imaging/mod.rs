//! Local image handling: format normalization, compression and logo overlay.

pub mod compositor;
pub mod normalize;
pub mod optimize;

use image::ImageFormat;

pub use compositor::{CompositeError, LogoCompositor};
pub use normalize::{DecodeError, normalize};
pub use optimize::{CompressionError, CompressionStats, OptimizeOutcome, OptimizeSettings, optimize};

/// Encoded image bytes plus the format they are believed to be in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    format: Option<ImageFormat>,
}

impl ImageAsset {
    /// Wraps bytes of a known format.
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self {
            bytes,
            format: Some(format),
        }
    }

    /// Wraps bytes, sniffing the format from the magic number.
    pub fn sniffed(bytes: Vec<u8>) -> Self {
        let format = image::guess_format(&bytes).ok();
        Self { bytes, format }
    }

    /// Raw encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the asset, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte length of the encoded image.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when there are no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Format, if known.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// File extension matching the format, `png` when unknown.
    pub fn extension(&self) -> &'static str {
        match self.format {
            Some(ImageFormat::Jpeg) => "jpeg",
            Some(ImageFormat::WebP) => "webp",
            Some(ImageFormat::Gif) => "gif",
            _ => "png",
        }
    }

    /// MIME type matching [`ImageAsset::extension`].
    pub fn mime_type(&self) -> &'static str {
        match self.format {
            Some(ImageFormat::Jpeg) => "image/jpeg",
            Some(ImageFormat::WebP) => "image/webp",
            Some(ImageFormat::Gif) => "image/gif",
            _ => "image/png",
        }
    }
}
