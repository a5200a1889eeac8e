//! Wall-clock frame pacing and the capture/compose/encode loop.
//!
//! Pacing is a poll with a short sleep between checks rather than a hard timer. Under
//! load the loop emits fewer frames than ideal instead of bursting to catch up, and it
//! never buffers frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::compositor::compose;
use super::encoder::VideoEncoderSink;
use super::error::RecorderError;
use super::source::FrameSource;
use super::webcam::WebcamSlot;

/// Sleep between due checks while recording.
pub const TICK_POLL_QUANTUM: Duration = Duration::from_micros(500);

/// Sleep between checks while paused.
pub const PAUSED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Log every Nth consecutive capture failure after the first.
const CAPTURE_FAILURE_LOG_EVERY: u64 = 100;

/// `running`/`paused` flags shared by the session and its worker threads.
///
/// Writers use release stores and readers acquire loads, so a stop or pause request
/// is visible to a worker at its next poll.
#[derive(Debug)]
pub struct LoopControl {
    running: AtomicBool,
    paused: AtomicBool,
}

impl LoopControl {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides when the next frame is due.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Duration,
    last_emit: Instant,
}

impl FrameScheduler {
    /// Scheduler whose first frame is due one interval after `start`.
    pub fn new(fps: u32, start: Instant) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            last_emit: start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_emit) >= self.interval
    }

    /// Records a tick taken at `now`. The next one is due a full interval later,
    /// however late this one was.
    pub fn mark_emitted(&mut self, now: Instant) {
        self.last_emit = now;
    }
}

/// Counters reported by the capture loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_written: u64,
    pub frames_skipped: u64,
}

/// Runs ticks until `control` stops it.
///
/// Each due tick captures one frame, overlays the latest webcam frame if there is one,
/// and writes the result. Frames reach the sink strictly in capture order. While paused
/// no tick happens and the scheduler's timestamp does not advance, so paused time
/// produces no frames at all.
///
/// # Errors
/// - `EncoderWrite` if the sink rejects a frame; capture failures only skip the tick
pub fn run_capture_loop(
    source: &FrameSource,
    webcam: Option<&WebcamSlot>,
    sink: &mut dyn VideoEncoderSink,
    control: &LoopControl,
    fps: u32,
) -> Result<CaptureStats, RecorderError> {
    let mut scheduler = FrameScheduler::new(fps, Instant::now());
    let mut stats = CaptureStats::default();
    let mut consecutive_failures = 0u64;

    tracing::debug!(
        "Capture loop started: {} at {} fps (interval {:?})",
        source.output_size(),
        fps,
        scheduler.interval()
    );

    while control.is_running() {
        if control.is_paused() {
            thread::sleep(PAUSED_POLL_INTERVAL);
            continue;
        }

        let now = Instant::now();
        if !scheduler.is_due(now) {
            thread::sleep(TICK_POLL_QUANTUM);
            continue;
        }

        match source.capture() {
            Ok(frame) => {
                consecutive_failures = 0;
                let overlay = webcam.and_then(WebcamSlot::latest);
                let frame = compose(frame, overlay.as_ref());
                match sink.write(&frame) {
                    Ok(()) => stats.frames_written += 1,
                    Err(e) if e.is_fatal_mid_session() => return Err(e),
                    Err(e) => {
                        stats.frames_skipped += 1;
                        tracing::warn!("Dropping frame the encoder rejected: {}", e);
                    }
                }
            }
            Err(e) => {
                stats.frames_skipped += 1;
                if consecutive_failures % CAPTURE_FAILURE_LOG_EVERY == 0 {
                    tracing::warn!(
                        "Skipping frame ({} skipped so far): {}",
                        stats.frames_skipped,
                        e
                    );
                }
                consecutive_failures += 1;
            }
        }
        scheduler.mark_emitted(now);
    }

    tracing::debug!(
        "Capture loop finished: {} frames written, {} skipped",
        stats.frames_written,
        stats.frames_skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::target::CaptureRect;
    use crate::recording::testing::{FakeEncoder, FakeScreen};
    use std::sync::Arc;

    #[test]
    fn test_due_after_one_interval() {
        let start = Instant::now();
        let mut sched = FrameScheduler::new(30, start);
        assert!(!sched.is_due(start));
        assert!(!sched.is_due(start + Duration::from_millis(30)));
        assert!(sched.is_due(start + Duration::from_millis(34)));

        // A late tick does not make the next one due early.
        let late = start + Duration::from_millis(80);
        sched.mark_emitted(late);
        assert!(!sched.is_due(late + Duration::from_millis(20)));
        assert!(sched.is_due(late + Duration::from_millis(34)));
    }

    #[test]
    fn test_zero_fps_clamped() {
        let sched = FrameScheduler::new(0, Instant::now());
        assert_eq!(sched.interval(), Duration::from_secs(1));
    }

    fn run_for(
        screen: FakeScreen,
        encoder: &FakeEncoder,
        run: Duration,
        paused: bool,
    ) -> Result<CaptureStats, RecorderError> {
        let source = FrameSource::new(Arc::new(screen), CaptureRect::new(0, 0, 64, 48), 1.0);
        let mut sink = encoder.sink();
        let control = Arc::new(LoopControl::new());
        control.set_paused(paused);

        let stopper = Arc::clone(&control);
        let timer = thread::spawn(move || {
            thread::sleep(run);
            stopper.request_stop();
        });
        let result = run_capture_loop(&source, None, &mut sink, &control, 30);
        timer.join().unwrap();
        result
    }

    #[test]
    fn test_loop_paces_to_fps() {
        let encoder = FakeEncoder::new();
        let stats = run_for(
            FakeScreen::with_monitors(1),
            &encoder,
            Duration::from_millis(500),
            false,
        )
        .unwrap();
        // 500ms at 30fps is 15 ticks; allow for scheduling jitter.
        assert!((10..=16).contains(&stats.frames_written), "{stats:?}");
        assert_eq!(encoder.frames_written() as u64, stats.frames_written);
    }

    #[test]
    fn test_paused_loop_emits_nothing() {
        let encoder = FakeEncoder::new();
        let stats = run_for(
            FakeScreen::with_monitors(1),
            &encoder,
            Duration::from_millis(300),
            true,
        )
        .unwrap();
        assert_eq!(stats.frames_written, 0);
        assert_eq!(encoder.frames_written(), 0);
    }

    #[test]
    fn test_capture_failures_are_skipped() {
        let encoder = FakeEncoder::new();
        let stats = run_for(
            FakeScreen::with_monitors(1).failing_every(2),
            &encoder,
            Duration::from_millis(400),
            false,
        )
        .unwrap();
        assert!(stats.frames_skipped > 0);
        assert!(stats.frames_written > 0);
    }

    #[test]
    fn test_write_failure_escalates() {
        let encoder = FakeEncoder::new().failing_after(3);
        let err = run_for(
            FakeScreen::with_monitors(1),
            &encoder,
            Duration::from_secs(2),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, RecorderError::EncoderWrite(_)));
        assert_eq!(encoder.frames_written(), 3);
    }

    #[test]
    fn test_recoverable_write_error_skips_frame() {
        let encoder = FakeEncoder::new().rejecting_every(3);
        let stats = run_for(
            FakeScreen::with_monitors(1),
            &encoder,
            Duration::from_millis(500),
            false,
        )
        .unwrap();
        assert!(stats.frames_skipped > 0, "{stats:?}");
        assert!(stats.frames_written >= 2 * stats.frames_skipped, "{stats:?}");
        assert_eq!(encoder.frames_written() as u64, stats.frames_written);
    }
}
