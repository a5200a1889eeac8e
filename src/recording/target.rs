//! Capture target resolution.
//!
//! A [`CaptureTarget`] is what the user picked; a [`CaptureRect`] is the pixel
//! rectangle sampled every tick. Resolution happens once, before any worker starts.

use std::fmt;

use crate::platform::ScreenBackend;

use super::error::RecorderError;

/// Screen rectangle in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for CaptureRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// What to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    /// Zero-based monitor index.
    Monitor(usize),
    /// Platform window handle.
    Window(u32),
    /// Explicit rectangle. `None` means the user never confirmed a selection.
    Region(Option<CaptureRect>),
}

impl CaptureTarget {
    /// Short mode name, used for the output file suffix.
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Monitor(_) => "monitor",
            Self::Window(_) => "window",
            Self::Region(_) => "region",
        }
    }

    /// Resolves the target into the rectangle sampled for the whole session.
    ///
    /// Window targets are resolved once here; a window moved or resized afterwards
    /// keeps being recorded at its original rectangle.
    ///
    /// # Errors
    /// - `TargetUnavailable` if the monitor index is out of range, the window no longer
    ///   exists, or the region was never confirmed or is empty
    pub fn resolve(&self, screen: &dyn ScreenBackend) -> Result<CaptureRect, RecorderError> {
        let rect = match self {
            Self::Monitor(index) => {
                let monitors = screen.list_monitors()?;
                monitors.get(*index).copied().ok_or_else(|| {
                    RecorderError::TargetUnavailable(format!(
                        "monitor {} does not exist ({} attached)",
                        index,
                        monitors.len()
                    ))
                })?
            }
            Self::Window(handle) => screen.window_rect(*handle).map_err(|e| {
                RecorderError::TargetUnavailable(format!("window {handle}: {e}"))
            })?,
            Self::Region(Some(rect)) => *rect,
            Self::Region(None) => {
                return Err(RecorderError::TargetUnavailable(
                    "no region selected".to_string(),
                ))
            }
        };

        if rect.width == 0 || rect.height == 0 {
            return Err(RecorderError::TargetUnavailable(format!(
                "{} target resolved to an empty rectangle {rect}",
                self.mode_name()
            )));
        }

        tracing::debug!("Resolved {} target to {}", self.mode_name(), rect);
        Ok(rect)
    }
}

/// Parses `X,Y,W,H` as given on the command line.
pub fn parse_region(spec: &str) -> Result<CaptureRect, String> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected X,Y,W,H but got '{spec}'"));
    }
    let x = parts[0].parse::<i32>().map_err(|e| format!("x: {e}"))?;
    let y = parts[1].parse::<i32>().map_err(|e| format!("y: {e}"))?;
    let width = parts[2].parse::<u32>().map_err(|e| format!("width: {e}"))?;
    let height = parts[3].parse::<u32>().map_err(|e| format!("height: {e}"))?;
    Ok(CaptureRect::new(x, y, width, height))
}
