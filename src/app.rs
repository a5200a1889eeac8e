//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to appropriate command handlers.

use crate::commands;
use crate::commands::record::{parse_duration, CaptureMode, RecordOptions};
use crate::commands::trim::parse_timestamp;
use crate::config;
use crate::logging;
use crate::recording::target::parse_region;
use crate::recording::{CaptureRect, Container, QualityPreset};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// A screen recorder with webcam overlay and microphone capture
#[derive(Parser)]
#[command(name = "fluxrec")]
#[command(version)]
#[command(about = "Screen recorder with webcam overlay and microphone capture")]
#[command(long_about = "Screen recorder with webcam overlay and microphone capture.\n\nFrames are captured at a steady rate, optionally composited with a webcam\npicture-in-picture, and encoded with ffmpeg. Microphone audio is recorded\nalongside and merged into the video when recording stops.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n    Record options can be used without explicitly saying 'record'.\n\nEXAMPLES:\n    # Record the primary monitor until Ctrl+C\n    $ fluxrec\n\n    # Record monitor 1 at 1080p60 with the microphone, for one minute\n    $ fluxrec record --monitor 1 --quality 1080p60 --audio --duration 60\n\n    # Record a region into an mkv\n    $ fluxrec --region 100,100,1280,720 --format mkv\n\n    # Cut the first 5 seconds off a recording\n    $ fluxrec trim recording.mp4 --start 5 --end 1:30\n\n    # Pause or resume a running recording from a hotkey\n    $ pkill -USR1 fluxrec")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/fluxrec/fluxrec.toml\n    Logs:               ~/.local/state/fluxrec/fluxrec.log.*"
)]
struct Cli {
    #[command(flatten)]
    record: RecordArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options of `fluxrec record`; anything left out comes from the config file.
#[derive(Args, Debug, Clone, Default)]
struct RecordArgs {
    /// What to capture (inferred from --window/--region when omitted)
    #[arg(long, value_enum)]
    mode: Option<CaptureMode>,

    /// Monitor index, see `fluxrec list-devices`
    #[arg(long, value_name = "N")]
    monitor: Option<usize>,

    /// Window id, see `fluxrec list-devices`
    #[arg(long, value_name = "ID")]
    window: Option<u32>,

    /// Screen region in virtual-desktop coordinates
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_region)]
    region: Option<CaptureRect>,

    /// Frame rate and resolution preset
    #[arg(short, long, value_enum)]
    quality: Option<QualityPreset>,

    /// Output container
    #[arg(short, long, value_enum)]
    format: Option<Container>,

    /// Record the microphone
    #[arg(long, overrides_with = "no_audio")]
    audio: bool,

    /// Do not record the microphone
    #[arg(long, overrides_with = "audio")]
    no_audio: bool,

    /// Overlay the webcam
    #[arg(long, overrides_with = "no_webcam")]
    webcam: bool,

    /// Do not overlay the webcam
    #[arg(long, overrides_with = "webcam")]
    no_webcam: bool,

    /// Stop automatically after this much recording time (seconds, MM:SS or HH:MM:SS)
    #[arg(short, long, value_name = "SECS", value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Keep the audio as a separate WAV instead of merging it
    #[arg(long)]
    no_merge: bool,

    /// Save directory for this recording
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

fn tri_state(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl From<RecordArgs> for RecordOptions {
    fn from(args: RecordArgs) -> Self {
        Self {
            mode: args.mode,
            monitor: args.monitor,
            window: args.window,
            region: args.region,
            quality: args.quality,
            format: args.format,
            audio: tri_state(args.audio, args.no_audio),
            webcam: tri_state(args.webcam, args.no_webcam),
            duration: args.duration,
            no_merge: args.no_merge,
            output_dir: args.output_dir,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record the screen (default)
    ///
    /// Ctrl+C stops the recording. SIGUSR1 toggles pause/resume.
    #[command(visible_alias = "r")]
    Record(RecordArgs),

    /// Cut a recording without re-encoding
    ///
    /// Writes <name>_trimmed.<ext> next to the input. Offsets accept
    /// seconds (12.5), MM:SS or HH:MM:SS.
    Trim {
        /// Recording to trim
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Start offset
        #[arg(short, long, value_parser = parse_timestamp)]
        start: f64,

        /// End offset
        #[arg(short, long, value_parser = parse_timestamp)]
        end: f64,
    },

    /// Merge a standalone audio track into a recording
    ///
    /// Retries a merge that failed when recording stopped. The video is
    /// replaced in place and the audio file removed on success.
    Merge {
        #[arg(value_name = "VIDEO")]
        video: PathBuf,

        #[arg(value_name = "AUDIO")]
        audio: PathBuf,
    },

    /// List recordings in the save directory, newest first
    #[command(visible_alias = "ls")]
    Recordings,

    /// Delete a recording
    Delete {
        /// File name in the save directory, or a path
        #[arg(value_name = "FILE")]
        file: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Open configuration file in your preferred editor
    ///
    /// Uses $VISUAL or $EDITOR, falling back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List monitors, windows, cameras and audio input devices
    ///
    /// Shows the ids to pass to --monitor and --window and to put in fluxrec.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   fluxrec completions bash > fluxrec.bash
    ///   fluxrec completions zsh > _fluxrec
    ///   fluxrec completions fish > fluxrec.fish
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the main application based on command-line arguments.
///
/// # Exit Codes
/// - 0: Success
/// - 1: General error
/// - 2: Usage error (invalid arguments)
///
/// # Errors
/// - If setup fails
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that need neither logging nor a config file
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "fluxrec", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            return match commands::handle_list_devices() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        Some(Commands::Logs) => {
            return match commands::handle_logs() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        _ => {}
    }

    // Initialize logging for all other commands
    logging::init_logging()?;

    crate::setup::ensure_config(&config::get_config_path()?)?;

    match cli.command {
        None => commands::handle_record(cli.record.into()).await?,
        Some(Commands::Record(args)) => commands::handle_record(args.into()).await?,
        Some(Commands::Trim { file, start, end }) => commands::handle_trim(&file, start, end)?,
        Some(Commands::Merge { video, audio }) => commands::handle_merge(&video, &audio)?,
        Some(Commands::Recordings) => commands::handle_recordings()?,
        Some(Commands::Delete { file, yes }) => {
            if let Err(e) = commands::handle_delete(&file, yes) {
                // cliclack already printed the cancellation
                let err_msg = e.to_string();
                if err_msg.contains("cancelled") || err_msg.contains("interrupted") {
                    process::exit(0);
                }
                return Err(e);
            }
        }
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bare_flags_record() {
        let cli = Cli::try_parse_from([
            "fluxrec",
            "--region",
            "10,20,640,480",
            "--audio",
            "--quality",
            "720p",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        let options: RecordOptions = cli.record.into();
        assert_eq!(options.region, Some(CaptureRect::new(10, 20, 640, 480)));
        assert_eq!(options.audio, Some(true));
        assert_eq!(options.webcam, None);
        assert_eq!(options.quality, Some(QualityPreset::P720));
    }

    #[test]
    fn test_negated_flags() {
        let cli = Cli::try_parse_from(["fluxrec", "record", "--no-audio", "--no-webcam"]).unwrap();
        let Some(Commands::Record(args)) = cli.command else {
            panic!("expected record");
        };
        let options: RecordOptions = args.into();
        assert_eq!(options.audio, Some(false));
        assert_eq!(options.webcam, Some(false));
    }

    #[test]
    fn test_trim_offsets() {
        let cli =
            Cli::try_parse_from(["fluxrec", "trim", "a.mp4", "--start", "5", "--end", "1:30"])
                .unwrap();
        let Some(Commands::Trim { start, end, .. }) = cli.command else {
            panic!("expected trim");
        };
        assert_eq!((start, end), (5.0, 90.0));
    }

    #[test]
    fn test_duration_flag() {
        let cli = Cli::try_parse_from(["fluxrec", "--duration", "1:30"]).unwrap();
        assert_eq!(cli.record.duration, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_unusable_duration_rejected() {
        for value in ["--duration=-1", "--duration=nan", "--duration=inf", "--duration=0"] {
            assert!(Cli::try_parse_from(["fluxrec", value]).is_err(), "{value} accepted");
        }
    }

    #[test]
    fn test_bad_region_rejected() {
        assert!(Cli::try_parse_from(["fluxrec", "--region", "1,2,3"]).is_err());
    }
}
