//! Image loading and decoding helpers
//!
//! Catalog images and uploaded query images are passed around as encoded
//! bytes. Pixel decoding belongs to the embedder; loading a file only checks
//! that its header names a known format and sane dimensions.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};

/// Decode image bytes (any format supported by the `image` crate)
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    if data.is_empty() {
        anyhow::bail!("image data is empty");
    }

    let format = detect_format(data).context("unrecognized image format")?;
    image::load_from_memory_with_format(data, format).context("failed to decode image")
}

/// Read width and height from the image header without decoding pixels.
pub fn read_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    let format = detect_format(data).context("unrecognized image format")?;
    let (width, height) = ImageReader::with_format(Cursor::new(data), format)
        .into_dimensions()
        .context("failed to read image header")?;

    if width == 0 || height == 0 {
        anyhow::bail!("image has no pixels ({width}x{height})");
    }
    Ok((width, height))
}

/// Read an image file and check its header.
///
/// Returns the encoded bytes as read from disk.
pub fn load_file(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read image {}", path.display()))?;

    read_dimensions(&data).with_context(|| format!("invalid image {}", path.display()))?;

    Ok(data)
}

/// Detect image format from bytes
pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

/// Encode an RGB image as PNG.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    img.write_to(&mut cursor, ImageFormat::Png)
        .context("failed to encode png")?;
    Ok(buf)
}
