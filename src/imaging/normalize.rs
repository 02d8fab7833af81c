//! Brings uploads into a format every provider accepts.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader};
use tracing::debug;

use super::ImageAsset;

/// Extensions passed straight through without decoding.
const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "jpe", "jfif"];

/// The upload could not be read as an image.
#[derive(Debug, thiserror::Error)]
#[error("Failed to decode uploaded image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

fn is_accepted(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

/// Returns the upload untouched when its extension is PNG or JPEG, otherwise
/// decodes it and re-encodes it as an RGBA PNG.
pub fn normalize(filename: &str, bytes: Vec<u8>) -> Result<ImageAsset, DecodeError> {
    if is_accepted(filename) {
        return Ok(ImageAsset::sniffed(bytes));
    }

    let reader = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|err| DecodeError(image::ImageError::IoError(err)))?;
    debug!(filename, format = ?reader.format(), "Converting upload to PNG");
    let image = reader.decode()?;

    let mut output = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut output, ImageFormat::Png)?;
    Ok(ImageAsset::new(output.into_inner(), ImageFormat::Png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_images::{encode, jpeg, solid_rgba};

    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[test]
    fn gif_becomes_rgba_png() {
        let gif = encode(&solid_rgba(32, 16, [0, 0, 255, 255]), ImageFormat::Gif);

        let asset = normalize("dog.gif", gif).expect("normalize gif");

        assert_eq!(asset.format(), Some(ImageFormat::Png));
        assert!(asset.bytes().starts_with(PNG_SIGNATURE));
        let decoded = image::load_from_memory(asset.bytes()).expect("decode png");
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn misnamed_jpeg_is_converted() {
        let asset = normalize("dog.webp", jpeg(20, 10)).expect("normalize");
        assert!(asset.bytes().starts_with(PNG_SIGNATURE));
    }

    #[test]
    fn accepted_extensions_pass_through() {
        let bytes = jpeg(8, 8);
        let asset = normalize("Dog.JPG", bytes.clone()).expect("normalize");
        assert_eq!(asset.bytes(), bytes.as_slice());
        assert_eq!(asset.format(), Some(ImageFormat::Jpeg));

        let asset = normalize("dog.jpeg", bytes.clone()).expect("normalize");
        assert_eq!(asset.bytes(), bytes.as_slice());
    }

    #[test]
    fn garbage_fails_with_decode_error() {
        assert!(normalize("dog.webp", b"webp-bytes".to_vec()).is_err());
        assert!(normalize("notes.txt", Vec::new()).is_err());
        assert!(normalize("no-extension", b"not an image".to_vec()).is_err());
    }
}
