//! Screen recording from the terminal.
//!
//! Builds a session config from the config file and command-line overrides, runs the
//! session until Ctrl+C or `--duration`, and prints where the result went. SIGUSR1
//! toggles pause, so a desktop hotkey can drive a running recorder.

use anyhow::anyhow;
use console::{style, Term};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::commands::trim::parse_timestamp;
use crate::config::FluxConfig;
use crate::platform;
use crate::recording::{
    CaptureRect, CaptureTarget, Collaborators, Container, FfmpegEncoderFactory, FfmpegTool,
    PostProcessor, QualityPreset, RecordingSession, SessionConfig, SessionEvent, SessionState,
    StopReport,
};

/// How often the status line refreshes and the session is polled.
const STATUS_INTERVAL: Duration = Duration::from_millis(200);

/// What `--mode` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptureMode {
    Monitor,
    Window,
    Region,
}

/// Command-line overrides for one recording. `None` means "use the config file".
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub mode: Option<CaptureMode>,
    pub monitor: Option<usize>,
    pub window: Option<u32>,
    pub region: Option<CaptureRect>,
    pub quality: Option<QualityPreset>,
    pub format: Option<Container>,
    pub audio: Option<bool>,
    pub webcam: Option<bool>,
    pub duration: Option<Duration>,
    pub no_merge: bool,
    pub output_dir: Option<PathBuf>,
}

impl RecordOptions {
    /// Capture target implied by the flags.
    ///
    /// Without `--mode`, passing `--window` or `--region` picks that mode.
    ///
    /// # Errors
    /// - If window mode is requested without a window id
    pub fn target(&self, config: &FluxConfig) -> anyhow::Result<CaptureTarget> {
        let mode = self.mode.unwrap_or(if self.window.is_some() {
            CaptureMode::Window
        } else if self.region.is_some() {
            CaptureMode::Region
        } else {
            CaptureMode::Monitor
        });

        Ok(match mode {
            CaptureMode::Monitor => {
                CaptureTarget::Monitor(self.monitor.unwrap_or(config.recording.monitor))
            }
            CaptureMode::Window => CaptureTarget::Window(self.window.ok_or_else(|| {
                anyhow!("Window mode needs --window <ID>; see `fluxrec list-devices`")
            })?),
            // An unconfirmed region is rejected by the session with a clear error.
            CaptureMode::Region => CaptureTarget::Region(self.region),
        })
    }

    /// Session config: file defaults with these overrides applied.
    pub fn session_config(&self, config: &FluxConfig) -> anyhow::Result<SessionConfig> {
        let mut session = config.session_config();
        session.target = self.target(config)?;
        if let Some(quality) = self.quality {
            session.fps = quality.fps();
            session.scale = quality.scale();
        }
        if let Some(format) = self.format {
            session.container = format;
        }
        if let Some(dir) = &self.output_dir {
            session.save_dir = dir.clone();
        }
        if let Some(audio) = self.audio {
            session.record_audio = audio;
        }
        if let Some(webcam) = self.webcam {
            session.webcam_device = webcam.then_some(config.recording.webcam_device);
        }
        session.merge_audio &= !self.no_merge;
        Ok(session)
    }
}

/// Parses `--duration`: seconds, MM:SS or HH:MM:SS, strictly positive.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let seconds = parse_timestamp(text)?;
    if seconds <= 0.0 {
        return Err(format!("duration must be positive, got '{text}'"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration '{text}': {e}"))
}

/// Records until Ctrl+C or the requested duration.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If the session fails to start or fails mid-recording
pub async fn handle_record(options: RecordOptions) -> Result<(), anyhow::Error> {
    tracing::info!("=== fluxrec recorder started ===");

    let config = FluxConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {e}");
        anyhow!("Configuration error: {e}\n\nPlease check ~/.config/fluxrec/fluxrec.toml")
    })?;
    let session_config = options.session_config(&config)?;
    tracing::info!("Session config: {:?}", session_config);

    let collaborators = Collaborators {
        screen: platform::default_screen(),
        camera: platform::default_camera(),
        audio: Some(platform::default_audio(config.audio.device.clone())),
        encoder: Arc::new(FfmpegEncoderFactory),
        post: PostProcessor::new(Arc::new(FfmpegTool), config.postprocess.merge_settings()),
    };

    let stop_requested = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop_requested);
    ctrlc::set_handler(move || stop_flag.store(true, Ordering::SeqCst))
        .map_err(|e| anyhow!("Failed to register Ctrl+C handler: {e}"))?;

    let pause_toggle = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&pause_toggle))
        .map_err(|e| anyhow!("Failed to register signal handler: {e}"))?;

    let mut session = RecordingSession::new(collaborators);
    let target = session_config.target.clone();
    let duration = options.duration;

    if let Err(e) = session.start(session_config) {
        return Err(anyhow!("Recording failed during {}: {e}", e.stage()));
    }

    let term = Term::stderr();
    if let Some(path) = session.video_path() {
        term.write_line(&format!(
            "{} Recording {} to {}",
            style("●").red().bold(),
            describe_target(&target),
            path.display()
        ))?;
    }
    term.write_line(&format!(
        "  {}",
        style("Ctrl+C to stop, `kill -USR1 <pid>` to pause/resume").dim()
    ))?;

    loop {
        for event in session.poll() {
            match event {
                SessionEvent::Warning { stage, message } => {
                    term.clear_line()?;
                    term.write_line(&format!("{} {stage}: {message}", style("!").yellow().bold()))?;
                }
                SessionEvent::Failed { stage, message } => {
                    term.clear_line()?;
                    return Err(anyhow!("Recording failed during {stage}: {message}"));
                }
            }
        }

        if stop_requested.load(Ordering::SeqCst) {
            tracing::info!("Stop requested");
            break;
        }
        if duration.is_some_and(|limit| session.elapsed() >= limit) {
            tracing::info!("Requested duration reached");
            break;
        }
        if pause_toggle.swap(false, Ordering::SeqCst) {
            match session.state() {
                SessionState::Recording => session.pause()?,
                SessionState::Paused => session.resume()?,
                _ => {}
            }
        }

        term.clear_line()?;
        term.write_str(&status_line(session.state(), session.elapsed()))?;
        tokio::time::sleep(STATUS_INTERVAL).await;
    }

    term.clear_line()?;
    term.write_line("Stopping...")?;

    // Joining workers and merging block, so keep them off the async runtime.
    let result = tokio::task::spawn_blocking(move || session.stop())
        .await
        .map_err(|e| anyhow!("Stop task failed: {e}"))?;
    let report = result.map_err(|e| anyhow!("Recording failed during {}: {e}", e.stage()))?;

    print_report(&term, &report)?;
    Ok(())
}

fn describe_target(target: &CaptureTarget) -> String {
    match target {
        CaptureTarget::Monitor(index) => format!("monitor {index}"),
        CaptureTarget::Window(id) => format!("window {id}"),
        CaptureTarget::Region(Some(rect)) => format!("region {rect}"),
        CaptureTarget::Region(None) => "region".to_string(),
    }
}

fn status_line(state: SessionState, elapsed: Duration) -> String {
    match state {
        SessionState::Paused => format!(
            "{} {}",
            style("❚❚ PAUSED").yellow().bold(),
            format_elapsed(elapsed)
        ),
        _ => format!("{} {}", style("● REC").red().bold(), format_elapsed(elapsed)),
    }
}

fn print_report(term: &Term, report: &StopReport) -> anyhow::Result<()> {
    term.write_line(&format!(
        "{} Saved {} ({}, {} frames)",
        style("✓").green().bold(),
        report.video_path.display(),
        format_elapsed(report.elapsed),
        report.stats.frames_written
    ))?;
    if report.merged {
        term.write_line("  audio merged into the video")?;
    }
    if let Some(audio) = &report.audio_path {
        term.write_line(&format!(
            "  audio kept separately at {} (retry with `fluxrec merge`)",
            audio.display()
        ))?;
    }
    for warning in &report.warnings {
        term.write_line(&format!("  {} {warning}", style("!").yellow()))?;
    }
    Ok(())
}

/// `HH:MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FluxConfig {
        let mut config = FluxConfig::default();
        config.recording.save_dir = "/tmp/recordings".to_string();
        config.recording.monitor = 1;
        config
    }

    #[test]
    fn test_mode_inferred_from_flags() {
        let config = config();
        let mut options = RecordOptions::default();
        assert_eq!(options.target(&config).unwrap(), CaptureTarget::Monitor(1));

        options.window = Some(42);
        assert_eq!(options.target(&config).unwrap(), CaptureTarget::Window(42));

        options.window = None;
        options.region = Some(CaptureRect::new(1, 2, 3, 4));
        assert_eq!(
            options.target(&config).unwrap(),
            CaptureTarget::Region(Some(CaptureRect::new(1, 2, 3, 4)))
        );
    }

    #[test]
    fn test_window_mode_needs_id() {
        let options = RecordOptions {
            mode: Some(CaptureMode::Window),
            ..RecordOptions::default()
        };
        assert!(options.target(&config()).is_err());
    }

    #[test]
    fn test_region_mode_without_rect_is_unconfirmed() {
        let options = RecordOptions {
            mode: Some(CaptureMode::Region),
            ..RecordOptions::default()
        };
        assert_eq!(
            options.target(&config()).unwrap(),
            CaptureTarget::Region(None)
        );
    }

    #[test]
    fn test_overrides_beat_file() {
        let options = RecordOptions {
            quality: Some(QualityPreset::P1080Fps60),
            format: Some(Container::Avi),
            audio: Some(true),
            webcam: Some(true),
            no_merge: true,
            output_dir: Some(PathBuf::from("/elsewhere")),
            ..RecordOptions::default()
        };
        let session = options.session_config(&config()).unwrap();
        assert_eq!(session.fps, 60);
        assert_eq!(session.container, Container::Avi);
        assert!(session.record_audio);
        assert_eq!(session.webcam_device, Some(0));
        assert!(!session.merge_audio);
        assert_eq!(session.save_dir, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_file_defaults_apply() {
        let session = RecordOptions::default().session_config(&config()).unwrap();
        assert_eq!(session.fps, 30);
        assert_eq!(session.scale, 1.0);
        assert_eq!(session.container, Container::Mp4);
        assert!(!session.record_audio);
        assert_eq!(session.webcam_device, None);
        assert!(session.merge_audio);
        assert_eq!(session.save_dir, PathBuf::from("/tmp/recordings"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1:30").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("0.5").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_duration_rejects_unusable_values() {
        for text in ["-1", "0", "nan", "NaN", "inf", "-inf", "1e400", "1e300", "abc", ""] {
            assert!(parse_duration(text).is_err(), "{text} accepted");
        }
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(61_900)), "00:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 7)), "03:00:07");
    }
}
