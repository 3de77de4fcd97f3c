//! Still-image encoding of retained frames.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::RgbImage;

use super::error::EncodeError;
use super::types::{FrameImage, PixelFormat};

/// JPEG quality for flushed frames (0-100).
const JPEG_QUALITY: u8 = 90;

/// Writes one frame to disk as a still image.
pub trait ImageEncoder: Send + Sync {
    /// File extension of the produced images, without the dot.
    fn extension(&self) -> &'static str;

    /// Encode `image` to `path`, overwriting any existing file.
    fn encode(&self, image: &FrameImage, path: &Path) -> Result<(), EncodeError>;
}

/// File name of the `index`-th flushed frame (1-based).
pub fn frame_file_name(index: usize, extension: &str) -> String {
    format!("screenshot{:04}.{}", index, extension)
}

/// JPEG encoder backed by the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(JPEG_QUALITY)
    }
}

impl ImageEncoder for JpegEncoder {
    fn extension(&self) -> &'static str {
        "jpg"
    }

    fn encode(&self, image: &FrameImage, path: &Path) -> Result<(), EncodeError> {
        let rgb = to_rgb(image)?;

        let file = File::create(path).map_err(|source| EncodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, self.quality);
        encoder
            .encode_image(&rgb)
            .map_err(|source| EncodeError::Image {
                path: path.to_path_buf(),
                source,
            })?;
        drop(encoder);

        std::io::Write::flush(&mut writer).map_err(|source| EncodeError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Drop alpha and reorder channels to RGB.
fn to_rgb(image: &FrameImage) -> Result<RgbImage, EncodeError> {
    let pixels = image.pixels();
    let mut rgb = Vec::with_capacity(pixels.len() / 4 * 3);
    match image.format() {
        PixelFormat::Bgra8 => {
            for chunk in pixels.chunks_exact(4) {
                rgb.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
            }
        }
        PixelFormat::Rgba8 => {
            for chunk in pixels.chunks_exact(4) {
                rgb.extend_from_slice(&chunk[..3]);
            }
        }
    }

    RgbImage::from_raw(image.width(), image.height(), rgb).ok_or_else(|| {
        EncodeError::InvalidImage(format!(
            "{}x{} image with {} bytes",
            image.width(),
            image.height(),
            pixels.len()
        ))
    })
}
