//! Configuration file management for fluxrec.
//!
//! The file lives at `~/.config/fluxrec/fluxrec.toml` and is created from the embedded
//! template on first run. It is read once per invocation and turned into an immutable
//! [`SessionConfig`]; editing it never affects a session that is already recording.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::recording::{
    CaptureTarget, Container, MergeSettings, QualityPreset, SessionConfig,
};

/// Defaults for `fluxrec record`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingConfig {
    /// Where recordings are written. A leading `~/` is expanded.
    #[serde(default = "default_save_dir")]
    pub save_dir: String,
    #[serde(default)]
    pub quality: QualityPreset,
    #[serde(default)]
    pub format: Container,
    /// Monitor index used in monitor mode.
    #[serde(default)]
    pub monitor: usize,
    /// Record the microphone alongside the video.
    #[serde(default)]
    pub audio: bool,
    /// Overlay the webcam in the bottom-right corner.
    #[serde(default)]
    pub webcam: bool,
    #[serde(default)]
    pub webcam_device: u32,
    /// Mux the microphone track into the video when recording stops.
    #[serde(default = "default_true")]
    pub merge_audio: bool,
}

fn default_save_dir() -> String {
    "~/Videos/FluxRecordings".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            quality: QualityPreset::default(),
            format: Container::default(),
            monitor: 0,
            audio: false,
            webcam: false,
            webcam_device: 0,
            merge_audio: true,
        }
    }
}

/// Audio input configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `fluxrec list-devices`
    /// - device name from `fluxrec list-devices`
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_device() -> String {
    "default".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
        }
    }
}

/// Merge settings as they appear in the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostProcessConfig {
    #[serde(default = "default_gain")]
    pub audio_gain: f32,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

fn default_gain() -> f32 {
    MergeSettings::default().gain
}

fn default_audio_codec() -> String {
    MergeSettings::default().audio_codec
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            audio_gain: default_gain(),
            audio_codec: default_audio_codec(),
        }
    }
}

impl PostProcessConfig {
    pub fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            gain: self.audio_gain,
            audio_codec: self.audio_codec.clone(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FluxConfig {
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub postprocess: PostProcessConfig,
}

impl FluxConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read
    /// - If the TOML is malformed
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read {}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| anyhow!("Invalid config {}: {e}", path.display()))
    }

    /// Save directory with `~` expanded.
    pub fn save_dir(&self) -> PathBuf {
        expand_home(&self.recording.save_dir)
    }

    /// Session config for the file's defaults in monitor mode.
    pub fn session_config(&self) -> SessionConfig {
        let webcam = self
            .recording
            .webcam
            .then_some(self.recording.webcam_device);
        SessionConfig::new(
            CaptureTarget::Monitor(self.recording.monitor),
            self.recording.quality,
            self.recording.format,
            self.save_dir(),
        )
        .with_audio(self.recording.audio)
        .with_webcam(webcam)
        .with_merge(self.recording.merge_audio)
    }
}

/// Expands a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}

/// Directory holding `fluxrec.toml`.
///
/// # Errors
/// - If the home directory cannot be determined
pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".config")
        .join("fluxrec"))
}

/// Retrieves the path to the config file, creating its directory.
///
/// # Errors
/// - If the config directory cannot be determined or created
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = get_config_dir()?;
    fs::create_dir_all(&config_dir)
        .map_err(|e| anyhow!("Failed to create config directory: {e}"))?;
    Ok(config_dir.join("fluxrec.toml"))
}
