//! ffmpeg discovery and the subprocess-backed encoding tool.
//!
//! The binary is looked up once per call: an explicit `FLUXREC_FFMPEG` override first,
//! then the usual install locations for the platform, then every directory on `PATH`.

use anyhow::{anyhow, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::error::RecorderError;
use super::postprocess::{EncodingTool, MergeSettings};

/// Environment variable pointing at a specific ffmpeg binary.
pub const FFMPEG_ENV: &str = "FLUXREC_FFMPEG";

/// Locates the ffmpeg binary on the system.
///
/// # Errors
/// - If `FLUXREC_FFMPEG` points at a missing file
/// - If ffmpeg is neither installed in a standard location nor on `PATH`
pub fn find_ffmpeg() -> Result<PathBuf> {
    locate_ffmpeg(std::env::var_os(FFMPEG_ENV))
}

/// Discovery with the override passed in rather than read from the environment.
fn locate_ffmpeg(explicit: Option<OsString>) -> Result<PathBuf> {
    if let Some(explicit) = explicit {
        let path = PathBuf::from(explicit);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(anyhow!(
                "{FFMPEG_ENV} is set to {} but no such file exists",
                path.display()
            ))
        };
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/opt/homebrew/bin/ffmpeg",
            "/usr/local/bin/ffmpeg",
            "/usr/bin/ffmpeg",
        ]
    } else if cfg!(target_os = "linux") {
        &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/snap/bin/ffmpeg"]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
        ]
    } else {
        &[]
    };

    if let Some(found) = candidates.iter().map(PathBuf::from).find(|p| p.is_file()) {
        tracing::debug!("Found ffmpeg at: {}", found.display());
        return Ok(found);
    }

    let binary = if cfg!(target_os = "windows") {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    };
    search_path(binary).ok_or_else(|| {
        anyhow!(
            "ffmpeg not found. Please install ffmpeg:\n\
             macOS: brew install ffmpeg\n\
             Linux: apt install ffmpeg (Debian/Ubuntu) or dnf install ffmpeg (Fedora)\n\
             Windows: Download from https://ffmpeg.org/download.html\n\
             or point {FFMPEG_ENV} at the binary."
        )
    })
}

fn search_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Arguments that mux `audio` into `video`, copying the video stream untouched.
pub fn merge_args(video: &Path, audio: &Path, output: &Path, settings: &MergeSettings) -> Vec<OsString> {
    vec![
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        settings.audio_codec.clone().into(),
        "-filter:a".into(),
        format!("volume={:.1}", settings.gain).into(),
        "-strict".into(),
        "experimental".into(),
        "-y".into(),
        output.into(),
    ]
}

/// Arguments for a stream-copy cut of `input` between two offsets in seconds.
pub fn trim_args(input: &Path, start_sec: f64, end_sec: f64, output: &Path) -> Vec<OsString> {
    vec![
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.into(),
        "-ss".into(),
        format!("{start_sec:.3}").into(),
        "-to".into(),
        format!("{end_sec:.3}").into(),
        "-c".into(),
        "copy".into(),
        "-y".into(),
        output.into(),
    ]
}

/// [`EncodingTool`] that shells out to ffmpeg with a checked exit status.
#[derive(Debug, Default, Clone)]
pub struct FfmpegTool;

impl FfmpegTool {
    fn run(&self, args: Vec<OsString>) -> std::result::Result<(), String> {
        let ffmpeg = find_ffmpeg().map_err(|e| e.to_string())?;
        let output = Command::new(&ffmpeg)
            .args(&args)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", ffmpeg.display()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("ffmpeg failed ({}): {}", output.status, stderr.trim());
            Err(format!("ffmpeg exited with {}: {}", output.status, stderr.trim()))
        }
    }
}

impl EncodingTool for FfmpegTool {
    fn mux_audio(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        settings: &MergeSettings,
    ) -> std::result::Result<(), RecorderError> {
        self.run(merge_args(video, audio, output, settings))
            .map_err(RecorderError::Merge)
    }

    fn stream_copy_trim(
        &self,
        input: &Path,
        start_sec: f64,
        end_sec: f64,
        output: &Path,
    ) -> std::result::Result<(), RecorderError> {
        self.run(trim_args(input, start_sec, end_sec, output))
            .map_err(RecorderError::Trim)
    }
}
