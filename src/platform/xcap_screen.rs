//! Screen backend on top of xcap.

use xcap::{Monitor, Window};

use crate::recording::error::RecorderError;
use crate::recording::frame::{PixelFormat, RawImage};
use crate::recording::target::CaptureRect;

use super::ScreenBackend;

#[derive(Debug, Default)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

fn monitor_rect(monitor: &Monitor) -> CaptureRect {
    CaptureRect::new(monitor.x(), monitor.y(), monitor.width(), monitor.height())
}

impl ScreenBackend for XcapScreen {
    fn list_monitors(&self) -> Result<Vec<CaptureRect>, RecorderError> {
        let monitors = Monitor::all()
            .map_err(|e| RecorderError::TargetUnavailable(format!("cannot list monitors: {e}")))?;
        Ok(monitors.iter().map(monitor_rect).collect())
    }

    fn window_rect(&self, handle: u32) -> Result<CaptureRect, RecorderError> {
        let windows = Window::all()
            .map_err(|e| RecorderError::TargetUnavailable(format!("cannot list windows: {e}")))?;
        let window = windows
            .iter()
            .find(|w| w.id() == handle)
            .ok_or_else(|| RecorderError::TargetUnavailable(format!("window {handle} not found")))?;
        if window.is_minimized() {
            return Err(RecorderError::TargetUnavailable(format!(
                "window {handle} is minimized"
            )));
        }
        Ok(CaptureRect::new(
            window.x(),
            window.y(),
            window.width(),
            window.height(),
        ))
    }

    fn grab_pixels(&self, rect: &CaptureRect) -> Result<RawImage, RecorderError> {
        let monitor = Monitor::from_point(rect.x, rect.y)
            .map_err(|e| RecorderError::CaptureFailure(format!("no monitor at {rect}: {e}")))?;
        let origin = monitor_rect(&monitor);
        let image = monitor
            .capture_image()
            .map_err(|e| RecorderError::CaptureFailure(e.to_string()))?;
        let (full_width, full_height) = image.dimensions();

        // Rectangles spilling past the monitor are clipped; FrameSource rescales.
        let left = (rect.x - origin.x).max(0) as u32;
        let top = (rect.y - origin.y).max(0) as u32;
        let width = rect.width.min(full_width.saturating_sub(left));
        let height = rect.height.min(full_height.saturating_sub(top));
        if width == 0 || height == 0 {
            return Err(RecorderError::CaptureFailure(format!(
                "{rect} lies outside its monitor"
            )));
        }

        let raw = image.into_raw();
        Ok(RawImage {
            width,
            height,
            format: PixelFormat::Rgba8,
            data: crop_rows(&raw, full_width, left, top, width, height),
        })
    }

    fn list_windows(&self) -> Result<Vec<(u32, String)>, RecorderError> {
        let windows = Window::all()
            .map_err(|e| RecorderError::TargetUnavailable(format!("cannot list windows: {e}")))?;
        Ok(windows
            .iter()
            .filter(|w| !w.is_minimized() && !w.title().is_empty())
            .map(|w| (w.id(), format!("{} ({})", w.title(), w.app_name())))
            .collect())
    }
}

/// Copies a `width`x`height` window out of a tightly packed RGBA buffer.
fn crop_rows(data: &[u8], stride_px: u32, left: u32, top: u32, width: u32, height: u32) -> Vec<u8> {
    let stride = stride_px as usize * 4;
    let row_len = width as usize * 4;
    let mut out = Vec::with_capacity(row_len * height as usize);
    for row in top..top + height {
        let start = row as usize * stride + left as usize * 4;
        out.extend_from_slice(&data[start..start + row_len]);
    }
    out
}
