//! Recording session lifecycle.
//!
//! ```text
//! Idle -> Recording <-> Paused -> Stopping -> Completed | Failed
//! ```
//!
//! The session is the only writer of its own state. Worker threads see it through the
//! shared [`LoopControl`] flags and report back only through their join results.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::platform::{AudioBackend, CameraBackend, ScreenBackend};

use super::audio::{AudioArtifact, AudioCaptureRecorder};
use super::encoder::{EncoderFactory, EncoderSpec};
use super::error::{RecorderError, Stage};
use super::join_with_timeout;
use super::output::OutputLayout;
use super::postprocess::PostProcessor;
use super::presets::{Container, QualityPreset};
use super::scheduler::{run_capture_loop, CaptureStats, LoopControl};
use super::source::FrameSource;
use super::target::CaptureTarget;
use super::webcam::WebcamReader;

/// Upper bound on waiting for each worker thread during stop.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Set while a session holds the process-wide recording slot.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Everything a session needs to know, fixed at `start`.
///
/// Changing preferences while a session runs only affects the next session's config.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub target: CaptureTarget,
    pub fps: u32,
    pub scale: f64,
    pub container: Container,
    pub save_dir: PathBuf,
    pub record_audio: bool,
    /// Camera to overlay, `None` for no overlay.
    pub webcam_device: Option<u32>,
    /// Mux the audio track into the video when the session stops.
    pub merge_audio: bool,
}

impl SessionConfig {
    pub fn new(
        target: CaptureTarget,
        quality: QualityPreset,
        container: Container,
        save_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            target,
            fps: quality.fps(),
            scale: quality.scale(),
            container,
            save_dir: save_dir.into(),
            record_audio: false,
            webcam_device: None,
            merge_audio: true,
        }
    }

    pub fn with_audio(mut self, record_audio: bool) -> Self {
        self.record_audio = record_audio;
        self
    }

    pub fn with_webcam(mut self, device: Option<u32>) -> Self {
        self.webcam_device = device;
        self
    }

    pub fn with_merge(mut self, merge_audio: bool) -> Self {
        self.merge_audio = merge_audio;
        self
    }
}

/// Platform collaborators and tools a session drives.
#[derive(Clone)]
pub struct Collaborators {
    pub screen: Arc<dyn ScreenBackend>,
    pub camera: Option<Arc<dyn CameraBackend>>,
    pub audio: Option<Arc<dyn AudioBackend>>,
    pub encoder: Arc<dyn EncoderFactory>,
    pub post: PostProcessor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
    Stopping,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Something the caller should tell the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A subsystem degraded; the recording goes on without it.
    Warning { stage: Stage, message: String },
    /// The session was aborted.
    Failed { stage: Stage, message: String },
}

impl SessionEvent {
    fn failed(error: &RecorderError) -> Self {
        Self::Failed {
            stage: error.stage(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a successful stop.
#[derive(Debug, Clone)]
pub struct StopReport {
    pub video_path: PathBuf,
    /// Standalone WAV, if audio was recorded and not merged.
    pub audio_path: Option<PathBuf>,
    pub merged: bool,
    pub stats: CaptureStats,
    /// Recorded time, pauses excluded.
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

/// Wall-clock time minus paused time.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    started: Instant,
    paused_total: Duration,
    paused_since: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl RecordingClock {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            paused_total: Duration::ZERO,
            paused_since: None,
            stopped_at: None,
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }

    /// Freezes the clock.
    pub fn stop(&mut self, now: Instant) {
        self.resume(now);
        self.stopped_at.get_or_insert(now);
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let now = self.stopped_at.unwrap_or(now);
        let paused = self.paused_total
            + self
                .paused_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default();
        now.saturating_duration_since(self.started)
            .saturating_sub(paused)
    }
}

/// Holds the process-wide recording slot until dropped.
struct ActiveSessionGuard;

impl ActiveSessionGuard {
    fn acquire() -> Result<Self, RecorderError> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| RecorderError::SessionAlreadyActive)
    }
}

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}

type CaptureResult = Result<CaptureStats, RecorderError>;

/// Workers and bookkeeping that exist only between `start` and teardown.
struct Running {
    config: SessionConfig,
    layout: OutputLayout,
    control: Arc<LoopControl>,
    capture: Option<JoinHandle<CaptureResult>>,
    audio: Option<AudioCaptureRecorder>,
    /// Audio thread result collected by `poll` before stop.
    early_audio: Option<AudioArtifact>,
    webcam: Option<WebcamReader>,
    clock: RecordingClock,
    _guard: ActiveSessionGuard,
}

/// Orchestrates one recording from target resolution to the merged artifact.
pub struct RecordingSession {
    collaborators: Collaborators,
    state: SessionState,
    running: Option<Running>,
    final_elapsed: Duration,
    events: Vec<SessionEvent>,
    join_timeout: Duration,
}

impl RecordingSession {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            state: SessionState::Idle,
            running: None,
            final_elapsed: Duration::ZERO,
            events: Vec::new(),
            join_timeout: JOIN_TIMEOUT,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Recorded time so far, pauses excluded.
    pub fn elapsed(&self) -> Duration {
        match &self.running {
            Some(running) => running.clock.elapsed_at(Instant::now()),
            None => self.final_elapsed,
        }
    }

    /// Video path of the session in progress.
    pub fn video_path(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.layout.video_path.as_path())
    }

    /// Starts recording.
    ///
    /// Target resolution and encoder setup happen before any worker thread exists;
    /// if either fails the session goes straight to `Failed`. Webcam and audio
    /// problems never fail the start, they are reported as warning events.
    ///
    /// # Errors
    /// - `InvalidTransition` unless the session is `Idle`
    /// - `SessionAlreadyActive` if another session in this process is recording
    /// - `TargetUnavailable` if the target cannot be resolved
    /// - `EncoderOpen` if the encoder cannot be constructed
    pub fn start(&mut self, config: SessionConfig) -> Result<(), RecorderError> {
        self.expect_state("start", &[SessionState::Idle])?;
        let guard = ActiveSessionGuard::acquire()?;

        match self.launch(config, guard) {
            Ok(running) => {
                tracing::info!(
                    "Recording started: {} ({} fps, scale {})",
                    running.layout.video_path.display(),
                    running.config.fps,
                    running.config.scale
                );
                self.running = Some(running);
                self.state = SessionState::Recording;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Recording setup failed: {}", e);
                self.events.push(SessionEvent::failed(&e));
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    fn launch(&mut self, config: SessionConfig, guard: ActiveSessionGuard) -> Result<Running, RecorderError> {
        let screen = Arc::clone(&self.collaborators.screen);
        let rect = config.target.resolve(screen.as_ref())?;
        let source = FrameSource::new(screen, rect, config.scale);
        let size = source.output_size();
        if size.is_empty() {
            return Err(RecorderError::TargetUnavailable(format!(
                "{rect} is empty at scale {}",
                config.scale
            )));
        }

        let layout = OutputLayout::new(&config.save_dir, Local::now(), &config.target, config.container);
        let mut sink = self.collaborators.encoder.open(&EncoderSpec {
            path: layout.video_path.clone(),
            fps: config.fps,
            size,
            container: config.container,
        })?;

        let control = Arc::new(LoopControl::new());
        let webcam = self.spawn_webcam(&config);
        let audio = self.spawn_audio(&config, &layout, &control);

        let slot = webcam.as_ref().map(WebcamReader::slot);
        let thread_control = Arc::clone(&control);
        let fps = config.fps;
        let capture = thread::Builder::new()
            .name("fluxrec-capture".to_string())
            .spawn(move || {
                let result = run_capture_loop(&source, slot.as_ref(), sink.as_mut(), &thread_control, fps);
                // The sink is closed here on every path, including write failures.
                let closed = sink.close();
                match (result, closed) {
                    (Ok(stats), Ok(())) => Ok(stats),
                    (Ok(_), Err(e)) | (Err(e), _) => Err(e),
                }
            });

        let capture = match capture {
            Ok(handle) => handle,
            Err(e) => {
                control.request_stop();
                return Err(RecorderError::io(&layout.video_path, e));
            }
        };

        Ok(Running {
            config,
            layout,
            control,
            capture: Some(capture),
            audio,
            early_audio: None,
            webcam,
            clock: RecordingClock::start(Instant::now()),
            _guard: guard,
        })
    }

    fn spawn_webcam(&mut self, config: &SessionConfig) -> Option<WebcamReader> {
        let device = config.webcam_device?;
        let Some(camera) = self.collaborators.camera.clone() else {
            self.warn(
                Stage::Webcam,
                "webcam overlay requested but no camera backend is available".to_string(),
            );
            return None;
        };
        match WebcamReader::spawn(camera, device) {
            Ok(reader) => Some(reader),
            Err(e) => {
                self.warn(Stage::Webcam, format!("webcam overlay disabled: {e}"));
                None
            }
        }
    }

    fn spawn_audio(
        &mut self,
        config: &SessionConfig,
        layout: &OutputLayout,
        control: &Arc<LoopControl>,
    ) -> Option<AudioCaptureRecorder> {
        if !config.record_audio {
            return None;
        }
        let Some(backend) = self.collaborators.audio.clone() else {
            self.warn(
                Stage::Audio,
                "audio capture requested but no audio backend is available".to_string(),
            );
            return None;
        };
        match AudioCaptureRecorder::spawn(backend, layout.audio_path.clone(), Arc::clone(control)) {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                self.warn(Stage::Audio, format!("audio capture disabled: {e}"));
                None
            }
        }
    }

    /// Stops emitting frames and audio until [`RecordingSession::resume`].
    pub fn pause(&mut self) -> Result<(), RecorderError> {
        self.expect_state("pause", &[SessionState::Recording])?;
        if let Some(running) = self.running.as_mut() {
            running.control.set_paused(true);
            running.clock.pause(Instant::now());
        }
        self.state = SessionState::Paused;
        tracing::info!("Recording paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), RecorderError> {
        self.expect_state("resume", &[SessionState::Paused])?;
        if let Some(running) = self.running.as_mut() {
            running.clock.resume(Instant::now());
            running.control.set_paused(false);
        }
        self.state = SessionState::Recording;
        tracing::info!("Recording resumed");
        Ok(())
    }

    /// Checks on the workers and drains pending events.
    ///
    /// An audio thread that exits before stop could not open its device; that is
    /// reported here as an audio warning and the recording goes on without sound. If
    /// the capture thread died on its own (an encoder write failure), the session is
    /// torn down here and a `Failed` event is returned.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        if matches!(self.state, SessionState::Recording | SessionState::Paused) {
            self.collect_early_audio();
        }

        let capture_exited = self
            .running
            .as_ref()
            .and_then(|r| r.capture.as_ref())
            .is_some_and(JoinHandle::is_finished);

        if capture_exited && matches!(self.state, SessionState::Recording | SessionState::Paused) {
            tracing::warn!("Capture thread exited while recording, tearing down");
            // teardown records the failure event itself
            let _ = self.teardown();
        }
        std::mem::take(&mut self.events)
    }

    fn collect_early_audio(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if !running.audio.as_ref().is_some_and(AudioCaptureRecorder::is_finished) {
            return;
        }
        let Some(audio) = running.audio.take() else {
            return;
        };
        match audio.join(self.join_timeout) {
            Ok(Some(artifact)) => running.early_audio = Some(artifact),
            Ok(None) => self.warn(
                Stage::Audio,
                "audio capture stopped early, no audio was captured".to_string(),
            ),
            Err(e) => self.warn(e.stage(), format!("audio capture disabled: {e}")),
        }
    }

    /// Stops all workers, finalizes the video and merges the audio track.
    ///
    /// A worker that misses the join timeout is left behind with a warning. A merge
    /// failure is a warning too: the session still completes and the WAV stays next
    /// to the video.
    ///
    /// # Errors
    /// - `InvalidTransition` unless recording or paused
    /// - `EncoderWrite` if the encoder failed during the session; the state is `Failed`
    pub fn stop(&mut self) -> Result<StopReport, RecorderError> {
        self.expect_state("stop", &[SessionState::Recording, SessionState::Paused])?;
        self.teardown()
    }

    fn teardown(&mut self) -> Result<StopReport, RecorderError> {
        let Some(mut running) = self.running.take() else {
            return Err(RecorderError::InvalidTransition {
                operation: "stop",
                state: self.state.as_str(),
            });
        };
        self.state = SessionState::Stopping;
        running.control.request_stop();
        running.clock.stop(Instant::now());
        self.final_elapsed = running.clock.elapsed_at(Instant::now());

        let mut warnings: Vec<(Stage, String)> = Vec::new();
        let mut capture_finished = true;
        let mut stats = CaptureStats::default();
        let mut fatal = None;

        if let Some(handle) = running.capture.take() {
            match join_with_timeout(handle, self.join_timeout, "capture") {
                Ok(Ok(s)) => stats = s,
                Ok(Err(e)) => fatal = Some(e),
                Err(e @ RecorderError::ThreadJoinTimeout(_)) => {
                    capture_finished = false;
                    warnings.push((e.stage(), e.to_string()));
                }
                Err(e) => fatal = Some(e),
            }
        }

        if let Some(mut webcam) = running.webcam.take() {
            if let Err(e) = webcam.stop(self.join_timeout) {
                warnings.push((Stage::Webcam, e.to_string()));
            }
        }

        let mut audio_path = running.early_audio.take().map(|artifact| artifact.path);
        if let Some(audio) = running.audio.take() {
            match audio.join(self.join_timeout) {
                Ok(Some(artifact)) => audio_path = Some(artifact.path),
                Ok(None) => warnings.push((Stage::Audio, "no audio was captured".to_string())),
                Err(e) => warnings.push((Stage::Audio, format!("audio track unavailable: {e}"))),
            }
        }

        if let Some(e) = fatal {
            self.push_warnings(&warnings);
            tracing::error!("Recording failed: {}", e);
            self.events.push(SessionEvent::failed(&e));
            self.state = SessionState::Failed;
            return Err(e);
        }

        let video_path = running.layout.video_path.clone();
        let mut merged = false;
        if let Some(audio) = audio_path.clone() {
            if !running.config.merge_audio {
                tracing::info!("Audio kept separately: {}", audio.display());
            } else if !capture_finished {
                warnings.push((
                    Stage::PostProcess,
                    format!("video may not be finalized, audio kept at {}", audio.display()),
                ));
            } else {
                match self.collaborators.post.merge(&video_path, &audio) {
                    Ok(()) => {
                        merged = true;
                        audio_path = None;
                    }
                    Err(e) => warnings.push((
                        Stage::PostProcess,
                        format!("{e}; audio kept at {}", audio.display()),
                    )),
                }
            }
        }

        self.push_warnings(&warnings);
        self.state = SessionState::Completed;
        tracing::info!(
            "Recording saved: {} ({} frames, {:.1}s)",
            video_path.display(),
            stats.frames_written,
            self.final_elapsed.as_secs_f64()
        );
        Ok(StopReport {
            video_path,
            audio_path,
            merged,
            stats,
            elapsed: self.final_elapsed,
            warnings: warnings.into_iter().map(|(_, message)| message).collect(),
        })
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), RecorderError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RecorderError::InvalidTransition {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn warn(&mut self, stage: Stage, message: String) {
        tracing::warn!("{}", message);
        self.events.push(SessionEvent::Warning { stage, message });
    }

    fn push_warnings(&mut self, warnings: &[(Stage, String)]) {
        for (stage, message) in warnings {
            self.warn(*stage, message.clone());
        }
    }
}

impl Drop for RecordingSession {
    /// A session dropped mid-recording still finalizes the video and flushes its WAV.
    fn drop(&mut self) {
        if self.running.is_some() {
            tracing::warn!("Recording session dropped while {}, finalizing", self.state.as_str());
            if let Err(e) = self.teardown() {
                tracing::error!("Finalizing dropped session failed: {}", e);
            }
        }
    }
}
