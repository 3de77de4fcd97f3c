//! Runtime types for capture operations (service-internal).
//!
//! A [`SurfaceView`] borrows the feed's pooled pixel memory for the duration
//! of one callback. A [`FrameImage`] is an owned, padding-free copy of it.

use super::error::CaptureError;

/// Pixel layouts delivered by the platform feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Windows Graphics Capture
    Bgra8,
    /// xcap
    Rgba8,
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 32,
        }
    }

    /// Bytes in one unpadded row of `width` pixels.
    pub fn row_pitch(self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel()).div_ceil(8)
    }
}

/// A surface as handed to a feed callback.
///
/// `pixels` belongs to the feed and is reused after the callback returns.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceView<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row in `pixels`, including any alignment padding
    pub stride: usize,
    pub pixels: &'a [u8],
}

impl<'a> SurfaceView<'a> {
    /// View over tightly packed rows.
    pub fn packed(width: u32, height: u32, format: PixelFormat, pixels: &'a [u8]) -> Self {
        Self {
            width,
            height,
            format,
            stride: format.row_pitch(width),
            pixels,
        }
    }
}

/// An owned image, decoupled from the feed's buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    width: u32,
    height: u32,
    array_size: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl FrameImage {
    /// Copy `view` into a new allocation, dropping stride padding.
    pub fn copy_from(view: &SurfaceView<'_>) -> Result<Self, CaptureError> {
        let row_pitch = view.format.row_pitch(view.width);
        let rows = view.height as usize;
        if view.stride < row_pitch {
            return Err(CaptureError::MalformedSurface(format!(
                "stride {} shorter than row of {} bytes",
                view.stride, row_pitch
            )));
        }
        let needed = match rows {
            0 => 0,
            n => view.stride * (n - 1) + row_pitch,
        };
        if view.pixels.len() < needed {
            return Err(CaptureError::MalformedSurface(format!(
                "expected {} bytes, got {}",
                needed,
                view.pixels.len()
            )));
        }

        let pixels = if view.stride == row_pitch {
            view.pixels[..needed].to_vec()
        } else {
            let mut output = Vec::with_capacity(row_pitch * rows);
            for row in 0..rows {
                let start = row * view.stride;
                output.extend_from_slice(&view.pixels[start..start + row_pitch]);
            }
            output
        };

        Ok(Self {
            width: view.width,
            height: view.height,
            array_size: 1,
            format: view.format,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Memory accounted to this image: row pitch × height × array size.
    pub fn footprint(&self) -> usize {
        self.format.row_pitch(self.width) * self.height as usize * self.array_size as usize
    }
}

/// A retained sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub image: FrameImage,
    /// Cached [`FrameImage::footprint`]
    pub size: usize,
}

impl Frame {
    pub fn new(image: FrameImage) -> Self {
        let size = image.footprint();
        Self { image, size }
    }
}
