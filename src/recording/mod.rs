//! Screen recording pipeline.
//!
//! A [`RecordingSession`] resolves a capture target, opens the encoder, and drives
//! three independent workers: the paced capture/compose/encode loop, the microphone
//! recorder and the webcam reader. When it stops, the audio track is merged into the
//! video by the [`PostProcessor`].

pub mod audio;
pub mod compositor;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod output;
pub mod postprocess;
pub mod presets;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod target;
pub mod webcam;

#[cfg(test)]
pub mod testing;

pub use encoder::FfmpegEncoderFactory;
pub use error::RecorderError;
pub use ffmpeg::FfmpegTool;
pub use output::list_recordings;
pub use postprocess::{MergeSettings, PostProcessor};
pub use presets::{Container, QualityPreset};
pub use session::{Collaborators, RecordingSession, SessionConfig, SessionEvent, SessionState, StopReport};
pub use target::{CaptureRect, CaptureTarget};

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Poll interval while waiting for a worker to finish.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Joins `handle`, giving up after `timeout`.
///
/// There is no forced termination: a thread that misses the deadline is left to
/// finish on its own and reported as `ThreadJoinTimeout`.
pub(crate) fn join_with_timeout<T>(
    handle: JoinHandle<T>,
    timeout: Duration,
    name: &'static str,
) -> Result<T, RecorderError> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("{} thread did not stop within {:?}", name, timeout);
            return Err(RecorderError::ThreadJoinTimeout(name));
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    handle.join().map_err(|_| {
        tracing::error!("{} thread panicked", name);
        RecorderError::WorkerPanicked(name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_returns_value() {
        let handle = thread::spawn(|| 7);
        assert_eq!(join_with_timeout(handle, Duration::from_secs(1), "test").unwrap(), 7);
    }

    #[test]
    fn test_join_times_out() {
        let handle = thread::spawn(|| thread::sleep(Duration::from_millis(500)));
        let err = join_with_timeout(handle, Duration::from_millis(50), "slow").unwrap_err();
        assert!(matches!(err, RecorderError::ThreadJoinTimeout("slow")));
    }

    #[test]
    fn test_join_reports_panic() {
        let handle = thread::spawn(|| panic!("boom"));
        let err = join_with_timeout::<()>(handle, Duration::from_secs(1), "worker").unwrap_err();
        assert!(matches!(err, RecorderError::WorkerPanicked("worker")));
    }
}
