//! Continuous webcam polling into a single-slot buffer.
//!
//! The reader publishes only the most recent camera frame. Older frames are
//! overwritten, never queued: the overlay only has to look current, so dropping
//! frames is the intended behaviour and the capture loop never waits on the camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::platform::{CameraBackend, CameraDevice};

use super::error::RecorderError;
use super::frame::Frame;
use super::join_with_timeout;

/// Wait after a failed frame read before trying again.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Wait after failing to open the device before trying again.
const OPEN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Consecutive read failures after which the device is closed and reopened.
const REOPEN_AFTER_FAILURES: u32 = 30;

/// Latest-frame-wins buffer shared between the webcam thread and the capture loop.
#[derive(Clone, Default)]
pub struct WebcamSlot {
    frame: Arc<Mutex<Option<Frame>>>,
}

impl WebcamSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored frame.
    pub fn store(&self, frame: Frame) {
        let mut slot = self.frame.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(frame);
    }

    /// Copy of the most recent frame; `None` if the camera has produced nothing yet.
    pub fn latest(&self) -> Option<Frame> {
        self.frame
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Background thread reading the camera as fast as it delivers.
pub struct WebcamReader {
    running: Arc<AtomicBool>,
    slot: WebcamSlot,
    handle: Option<JoinHandle<()>>,
}

impl WebcamReader {
    /// Spawns the reader thread.
    ///
    /// The device is opened on the reader thread. A camera that cannot be opened or
    /// read is retried in the background; it never surfaces as an error here.
    ///
    /// # Errors
    /// - If the OS refuses to spawn the thread
    pub fn spawn(backend: Arc<dyn CameraBackend>, device_id: u32) -> Result<Self, RecorderError> {
        let running = Arc::new(AtomicBool::new(true));
        let slot = WebcamSlot::new();

        let thread_running = Arc::clone(&running);
        let thread_slot = slot.clone();
        let handle = thread::Builder::new()
            .name("fluxrec-webcam".to_string())
            .spawn(move || run_reader(backend.as_ref(), device_id, &thread_running, &thread_slot))
            .map_err(|e| RecorderError::DeviceUnavailable {
                device: "webcam",
                reason: format!("failed to spawn reader thread: {e}"),
            })?;

        tracing::debug!("Webcam reader started for device {}", device_id);
        Ok(Self {
            running,
            slot,
            handle: Some(handle),
        })
    }

    /// Handle to the slot this reader publishes into.
    pub fn slot(&self) -> WebcamSlot {
        self.slot.clone()
    }

    /// Most recent camera frame, if any.
    #[cfg(test)]
    pub fn latest(&self) -> Option<Frame> {
        self.slot.latest()
    }

    /// Signals the thread to exit and waits up to `timeout` for it.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), RecorderError> {
        self.running.store(false, Ordering::Release);
        match self.handle.take() {
            Some(handle) => join_with_timeout(handle, timeout, "webcam").map(|_| ()),
            None => Ok(()),
        }
    }
}

impl Drop for WebcamReader {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

fn run_reader(backend: &dyn CameraBackend, device_id: u32, running: &AtomicBool, slot: &WebcamSlot) {
    let mut device: Option<Box<dyn CameraDevice>> = None;
    let mut open_failures = 0u32;
    let mut read_failures = 0u32;

    while running.load(Ordering::Acquire) {
        let Some(camera) = device.as_mut() else {
            match backend.open_device(device_id) {
                Ok(opened) => {
                    if open_failures > 0 {
                        tracing::info!("Webcam {} available again", device_id);
                    }
                    open_failures = 0;
                    device = Some(opened);
                }
                Err(e) => {
                    if open_failures == 0 {
                        tracing::warn!("Webcam {} unavailable, retrying: {}", device_id, e);
                    }
                    open_failures += 1;
                    thread::sleep(OPEN_RETRY_DELAY);
                }
            }
            continue;
        };

        match camera.read_frame().and_then(Frame::from_raw) {
            Ok(frame) => {
                read_failures = 0;
                slot.store(frame);
            }
            Err(e) => {
                read_failures += 1;
                if read_failures == 1 {
                    tracing::debug!("Webcam read failed: {}", e);
                }
                if read_failures >= REOPEN_AFTER_FAILURES {
                    tracing::warn!(
                        "Webcam {} failed {} reads in a row, reopening",
                        device_id,
                        read_failures
                    );
                    device = None;
                    read_failures = 0;
                }
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }

    tracing::debug!("Webcam reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::frame::FrameSize;
    use crate::recording::testing::FakeCamera;
    use std::time::Instant;

    fn wait_for<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_slot_latest_wins() {
        let slot = WebcamSlot::new();
        assert!(slot.latest().is_none());
        slot.store(Frame::filled(FrameSize::new(2, 2), [1, 1, 1]));
        slot.store(Frame::filled(FrameSize::new(3, 3), [2, 2, 2]));
        assert_eq!(slot.latest().unwrap().size(), FrameSize::new(3, 3));
        // Reading copies out; the slot keeps its frame.
        assert!(slot.latest().is_some());
    }

    #[test]
    fn test_reader_publishes_frames() {
        let camera = Arc::new(FakeCamera::producing(FrameSize::new(64, 48)));
        let mut reader = WebcamReader::spawn(camera, 0).unwrap();
        assert!(wait_for(|| reader.latest().is_some(), Duration::from_secs(2)));
        assert_eq!(reader.latest().unwrap().size(), FrameSize::new(64, 48));
        reader.stop(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_failing_camera_leaves_slot_empty() {
        let camera = Arc::new(FakeCamera::failing_reads());
        let mut reader = WebcamReader::spawn(camera.clone(), 0).unwrap();
        assert!(wait_for(|| camera.reads() >= 2, Duration::from_secs(2)));
        assert!(reader.latest().is_none());
        reader.stop(Duration::from_secs(2)).unwrap();
    }
}
