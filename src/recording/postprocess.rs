//! Audio/video merge and lossless trim of finished recordings.
//!
//! The actual media work is delegated to an [`EncodingTool`]; this module owns the
//! validation and the file shuffling around it. Original files are only replaced or
//! removed after the tool reports success.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::RecorderError;
use super::output::sibling_with_suffix;

/// Audio treatment applied when muxing the microphone track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Volume multiplier applied to the recorded audio.
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// ffmpeg audio encoder name.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

fn default_gain() -> f32 {
    5.0
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            gain: default_gain(),
            audio_codec: default_audio_codec(),
        }
    }
}

/// External tool performing stream-level media operations.
pub trait EncodingTool: Send + Sync {
    /// Writes `output` containing `video`'s video stream copied as-is and `audio`
    /// re-encoded per `settings`.
    fn mux_audio(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        settings: &MergeSettings,
    ) -> Result<(), RecorderError>;

    /// Writes `output` containing `input` between two offsets, without re-encoding.
    fn stream_copy_trim(
        &self,
        input: &Path,
        start_sec: f64,
        end_sec: f64,
        output: &Path,
    ) -> Result<(), RecorderError>;
}

/// Merges and trims finished recordings.
#[derive(Clone)]
pub struct PostProcessor {
    tool: Arc<dyn EncodingTool>,
    settings: MergeSettings,
}

impl PostProcessor {
    pub fn new(tool: Arc<dyn EncodingTool>, settings: MergeSettings) -> Self {
        Self { tool, settings }
    }

    /// Muxes `audio_path` into `video_path` in place and removes the standalone audio.
    ///
    /// The merged file is written next to the video first and renamed over it only once
    /// the tool succeeded, so a failure at any point leaves both originals untouched.
    ///
    /// # Errors
    /// - `Merge` if either input is missing, the tool fails, or the rename fails
    pub fn merge(&self, video_path: &Path, audio_path: &Path) -> Result<(), RecorderError> {
        for input in [video_path, audio_path] {
            if !input.is_file() {
                return Err(RecorderError::Merge(format!(
                    "{} does not exist",
                    input.display()
                )));
            }
        }

        let merged = sibling_with_suffix(video_path, "_with_audio");
        tracing::info!(
            "Merging {} into {}",
            audio_path.display(),
            video_path.display()
        );

        if let Err(e) = self
            .tool
            .mux_audio(video_path, audio_path, &merged, &self.settings)
        {
            remove_partial(&merged);
            return Err(match e {
                RecorderError::Merge(_) => e,
                other => RecorderError::Merge(other.to_string()),
            });
        }

        if !merged.is_file() {
            return Err(RecorderError::Merge(format!(
                "encoder reported success but {} was not written",
                merged.display()
            )));
        }

        if let Err(e) = fs::rename(&merged, video_path) {
            remove_partial(&merged);
            return Err(RecorderError::Merge(format!(
                "could not replace {}: {e}",
                video_path.display()
            )));
        }

        if let Err(e) = fs::remove_file(audio_path) {
            tracing::warn!(
                "Merged, but failed to remove {}: {}",
                audio_path.display(),
                e
            );
        }
        tracing::info!("Audio merge successful: {}", video_path.display());
        Ok(())
    }

    /// Cuts `video_path` between `start_sec` and `end_sec` into `<name>_trimmed.<ext>`.
    ///
    /// # Errors
    /// - `Trim` if `start_sec >= end_sec` or either is negative or not finite, checked
    ///   before the tool runs
    /// - `Trim` if the input is missing or the tool fails
    pub fn trim(&self, video_path: &Path, start_sec: f64, end_sec: f64) -> Result<PathBuf, RecorderError> {
        validate_trim_range(start_sec, end_sec)?;
        if !video_path.is_file() {
            return Err(RecorderError::Trim(format!(
                "{} does not exist",
                video_path.display()
            )));
        }

        let output = sibling_with_suffix(video_path, "_trimmed");
        tracing::info!(
            "Trimming {} [{:.3}s..{:.3}s] -> {}",
            video_path.display(),
            start_sec,
            end_sec,
            output.display()
        );

        if let Err(e) = self
            .tool
            .stream_copy_trim(video_path, start_sec, end_sec, &output)
        {
            remove_partial(&output);
            return Err(match e {
                RecorderError::Trim(_) => e,
                other => RecorderError::Trim(other.to_string()),
            });
        }
        Ok(output)
    }
}

/// Rejects empty, inverted, negative or non-finite ranges.
pub fn validate_trim_range(start_sec: f64, end_sec: f64) -> Result<(), RecorderError> {
    if !start_sec.is_finite() || !end_sec.is_finite() {
        return Err(RecorderError::Trim("trim offsets must be finite".to_string()));
    }
    if start_sec < 0.0 {
        return Err(RecorderError::Trim(format!(
            "start {start_sec}s is negative"
        )));
    }
    if start_sec >= end_sec {
        return Err(RecorderError::Trim(format!(
            "start {start_sec}s must be before end {end_sec}s"
        )));
    }
    Ok(())
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::debug!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}
