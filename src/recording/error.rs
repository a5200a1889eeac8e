//! Error taxonomy for the capture pipeline.
//!
//! Errors are grouped by how the session reacts to them: setup errors abort before
//! any worker thread starts, per-frame and per-chunk errors are skipped where they
//! happen, and only an encoder write failure tears down a running session.

use std::fmt;
use std::path::PathBuf;

/// Pipeline stage an error originated from, reported with every error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Capture,
    Encode,
    Audio,
    Webcam,
    PostProcess,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Capture => write!(f, "screen capture"),
            Self::Encode => write!(f, "video encoding"),
            Self::Audio => write!(f, "audio capture"),
            Self::Webcam => write!(f, "webcam"),
            Self::PostProcess => write!(f, "post-processing"),
        }
    }
}

/// Every failure the recorder core can report.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Monitor index out of range, window gone, or region never confirmed.
    #[error("capture target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("failed to open video encoder: {0}")]
    EncoderOpen(String),

    #[error("video encoder write failed: {0}")]
    EncoderWrite(String),

    #[error("screen capture failed: {0}")]
    CaptureFailure(String),

    #[error("webcam overlay failed: {0}")]
    OverlayFailure(String),

    #[error("audio read failed: {0}")]
    AudioReadFailure(String),

    #[error("{device} device unavailable: {reason}")]
    DeviceUnavailable { device: &'static str, reason: String },

    #[error("audio/video merge failed: {0}")]
    Merge(String),

    #[error("trim failed: {0}")]
    Trim(String),

    #[error("{0} thread did not stop within the join timeout")]
    ThreadJoinTimeout(&'static str),

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),

    #[error("cannot {operation} while session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("another recording session is already active in this process")]
    SessionAlreadyActive,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecorderError {
    /// Stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::TargetUnavailable(_)
            | Self::InvalidTransition { .. }
            | Self::SessionAlreadyActive => Stage::Setup,
            Self::EncoderOpen(_) | Self::EncoderWrite(_) => Stage::Encode,
            Self::CaptureFailure(_) | Self::ThreadJoinTimeout(_) | Self::WorkerPanicked(_) => {
                Stage::Capture
            }
            Self::OverlayFailure(_) => Stage::Webcam,
            Self::AudioReadFailure(_) => Stage::Audio,
            Self::DeviceUnavailable { device, .. } => {
                if *device == "webcam" {
                    Stage::Webcam
                } else {
                    Stage::Audio
                }
            }
            Self::Merge(_) | Self::Trim(_) | Self::Io { .. } => Stage::PostProcess,
        }
    }

    /// Whether the error must terminate a running session.
    ///
    /// A broken encoder cannot produce a usable artifact; everything else that can
    /// happen mid-session is skipped locally.
    pub fn is_fatal_mid_session(&self) -> bool {
        matches!(self, Self::EncoderWrite(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_encoder_write_is_fatal() {
        assert!(RecorderError::EncoderWrite("broken pipe".into()).is_fatal_mid_session());
        assert!(!RecorderError::CaptureFailure("grab".into()).is_fatal_mid_session());
        assert!(!RecorderError::OverlayFailure("resize".into()).is_fatal_mid_session());
        assert!(!RecorderError::AudioReadFailure("overflow".into()).is_fatal_mid_session());
    }

    #[test]
    fn test_device_unavailable_stage() {
        let webcam = RecorderError::DeviceUnavailable {
            device: "webcam",
            reason: "busy".into(),
        };
        let audio = RecorderError::DeviceUnavailable {
            device: "audio",
            reason: "no input".into(),
        };
        assert_eq!(webcam.stage(), Stage::Webcam);
        assert_eq!(audio.stage(), Stage::Audio);
        assert_eq!(
            RecorderError::TargetUnavailable("monitor 99".into()).stage(),
            Stage::Setup
        );
    }
}
