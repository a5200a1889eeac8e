//! Narrow interfaces to the OS capture primitives.
//!
//! The recorder core never talks to a display server, camera driver or sound server
//! directly; it goes through these traits. Real implementations live in the
//! submodules (some behind cargo features), and `recording::testing` provides fakes.

pub mod cpal_audio;
#[cfg(feature = "webcam")]
pub mod nokhwa_camera;
#[cfg(feature = "native-capture")]
pub mod xcap_screen;

use std::sync::Arc;

use crate::recording::error::RecorderError;
use crate::recording::frame::RawImage;
use crate::recording::target::CaptureRect;

/// Monitor enumeration, window geometry and pixel grabs.
pub trait ScreenBackend: Send + Sync {
    /// Rectangles of all attached monitors, in the order users select them by index.
    fn list_monitors(&self) -> Result<Vec<CaptureRect>, RecorderError>;

    /// Current on-screen rectangle of a window.
    fn window_rect(&self, handle: u32) -> Result<CaptureRect, RecorderError>;

    /// Reads the pixels of `rect` in the backend's native layout.
    fn grab_pixels(&self, rect: &CaptureRect) -> Result<RawImage, RecorderError>;

    /// Capturable windows as `(handle, title)`, for listing only.
    fn list_windows(&self) -> Result<Vec<(u32, String)>, RecorderError> {
        Ok(Vec::new())
    }
}

/// An open camera stream. Lives on the webcam thread only.
pub trait CameraDevice {
    fn read_frame(&mut self) -> Result<RawImage, RecorderError>;
}

/// Opens camera streams by device index.
pub trait CameraBackend: Send + Sync {
    fn open_device(&self, id: u32) -> Result<Box<dyn CameraDevice>, RecorderError>;

    /// Cameras as `(index, name)`, for listing only.
    fn list_devices(&self) -> Result<Vec<(u32, String)>, RecorderError> {
        Ok(Vec::new())
    }
}

/// PCM layout requested from, and reported by, an audio input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// 16-bit stereo at 44.1 kHz.
    pub const CAPTURE: AudioFormat = AudioFormat {
        sample_rate: 44_100,
        channels: 2,
    };
}

/// An open input stream. Lives on the audio thread only.
pub trait AudioInput {
    /// Format the stream actually delivers, which may differ from the one requested.
    fn format(&self) -> AudioFormat;

    /// Blocks until `frames` interleaved frames of 16-bit samples are available.
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<i16>, RecorderError>;

    /// Drops whatever the device buffered while nobody was reading.
    fn discard_pending(&mut self) {}
}

/// Opens audio input streams.
pub trait AudioBackend: Send + Sync {
    fn open_input_stream(&self, format: AudioFormat) -> Result<Box<dyn AudioInput>, RecorderError>;
}

/// Screen backend compiled into this binary.
#[cfg(feature = "native-capture")]
pub fn default_screen() -> Arc<dyn ScreenBackend> {
    Arc::new(xcap_screen::XcapScreen::new())
}

/// Screen backend compiled into this binary.
#[cfg(not(feature = "native-capture"))]
pub fn default_screen() -> Arc<dyn ScreenBackend> {
    Arc::new(UnsupportedScreen)
}

/// Camera backend compiled into this binary, if any.
#[cfg(feature = "webcam")]
pub fn default_camera() -> Option<Arc<dyn CameraBackend>> {
    Some(Arc::new(nokhwa_camera::NokhwaCamera))
}

/// Camera backend compiled into this binary, if any.
#[cfg(not(feature = "webcam"))]
pub fn default_camera() -> Option<Arc<dyn CameraBackend>> {
    None
}

pub fn default_audio(device: String) -> Arc<dyn AudioBackend> {
    Arc::new(cpal_audio::CpalAudio::new(device))
}

/// Stand-in used when the binary was built without `native-capture`.
#[cfg(not(feature = "native-capture"))]
struct UnsupportedScreen;

#[cfg(not(feature = "native-capture"))]
impl UnsupportedScreen {
    fn error() -> RecorderError {
        RecorderError::TargetUnavailable(
            "fluxrec was built without screen capture support; rebuild with `--features native-capture`"
                .to_string(),
        )
    }
}

#[cfg(not(feature = "native-capture"))]
impl ScreenBackend for UnsupportedScreen {
    fn list_monitors(&self) -> Result<Vec<CaptureRect>, RecorderError> {
        Err(Self::error())
    }

    fn window_rect(&self, _handle: u32) -> Result<CaptureRect, RecorderError> {
        Err(Self::error())
    }

    fn grab_pixels(&self, _rect: &CaptureRect) -> Result<RawImage, RecorderError> {
        Err(Self::error())
    }
}
