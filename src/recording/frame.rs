//! Pixel buffers flowing through the pipeline.
//!
//! Platform collaborators hand back a [`RawImage`] in whatever layout they produce
//! natively. [`Frame::from_raw`] normalizes that into packed 3-channel RGB, which is the
//! only layout the compositor and the encoder ever see.

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::error::RecorderError;

/// Native pixel layouts the platform collaborators may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
    Bgr8,
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra8 | Self::Rgba8 => 4,
            Self::Bgr8 | Self::Rgb8 => 3,
        }
    }
}

/// Tightly packed image as returned by a screen grab or a camera read.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Integer frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Output size for a capture of `width`x`height` at `scale`: `floor(w*scale)`, `floor(h*scale)`.
    pub fn scaled(width: u32, height: u32, scale: f64) -> Self {
        Self {
            width: (f64::from(width) * scale).floor() as u32,
            height: (f64::from(height) * scale).floor() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One normalized RGB frame. Created per tick, consumed by compositor and encoder,
/// then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Converts a native image into packed RGB.
    ///
    /// # Errors
    /// - If the buffer length does not match `width * height * bytes_per_pixel`
    pub fn from_raw(raw: RawImage) -> Result<Self, RecorderError> {
        let RawImage {
            width,
            height,
            format,
            data,
        } = raw;
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(RecorderError::CaptureFailure(format!(
                "{width}x{height} {format:?} image needs {expected} bytes, got {}",
                data.len()
            )));
        }

        let rgb = match format {
            PixelFormat::Rgb8 => data,
            PixelFormat::Bgr8 => data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelFormat::Rgba8 => data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelFormat::Bgra8 => data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };

        RgbImage::from_raw(width, height, rgb)
            .map(Self::from_image)
            .ok_or_else(|| RecorderError::CaptureFailure("invalid image buffer".to_string()))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// Solid-colour frame, mostly useful for synthetic sources.
    pub fn filled(size: FrameSize, rgb: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(size.width, size.height, image::Rgb(rgb)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width(), self.height())
    }

    /// Packed RGB24 bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Resamples to exactly `size` with an area-weighted filter.
    ///
    /// The triangle filter's support is stretched by the downscale ratio, so every
    /// destination pixel averages the whole source area it covers instead of
    /// point-sampling it.
    pub fn resized(self, size: FrameSize) -> Self {
        if self.size() == size {
            return self;
        }
        Self {
            image: imageops::resize(&self.image, size.width, size.height, FilterType::Triangle),
        }
    }
}
