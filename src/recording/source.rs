//! Per-tick screen sampling.

use std::sync::Arc;

use crate::platform::ScreenBackend;

use super::error::RecorderError;
use super::frame::{Frame, FrameSize};
use super::target::CaptureRect;

/// Pulls one normalized, scaled frame from a fixed rectangle.
pub struct FrameSource {
    screen: Arc<dyn ScreenBackend>,
    rect: CaptureRect,
    output_size: FrameSize,
}

impl FrameSource {
    pub fn new(screen: Arc<dyn ScreenBackend>, rect: CaptureRect, scale: f64) -> Self {
        Self {
            screen,
            rect,
            output_size: FrameSize::scaled(rect.width, rect.height, scale),
        }
    }

    /// Size of every frame this source produces.
    pub fn output_size(&self) -> FrameSize {
        self.output_size
    }

    /// Grabs the rectangle and returns it as an RGB frame of exactly `output_size()`.
    ///
    /// A grab that comes back at a different size (display mode change, rectangle
    /// clipped by the screen edge) is resampled to the session size rather than
    /// handed to the encoder mismatched.
    ///
    /// # Errors
    /// - `CaptureFailure` if the grab or pixel normalization fails; callers skip the tick
    pub fn capture(&self) -> Result<Frame, RecorderError> {
        let raw = self.screen.grab_pixels(&self.rect)?;
        let frame = Frame::from_raw(raw)?;
        Ok(frame.resized(self.output_size))
    }
}
