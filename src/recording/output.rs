//! Output file layout inside the save directory.

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

use super::presets::Container;
use super::target::CaptureTarget;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Paths of the artifacts one session produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
}

impl OutputLayout {
    /// `recording_<timestamp>[_<mode>].<ext>` and `audio_<timestamp>.wav`.
    ///
    /// Monitor recordings carry no mode suffix.
    pub fn new(
        save_dir: &Path,
        started_at: DateTime<Local>,
        target: &CaptureTarget,
        container: Container,
    ) -> Self {
        let timestamp = started_at.format(TIMESTAMP_FORMAT).to_string();
        let suffix = match target {
            CaptureTarget::Monitor(_) => String::new(),
            other => format!("_{}", other.mode_name()),
        };
        Self {
            video_path: save_dir.join(format!(
                "recording_{timestamp}{suffix}.{}",
                container.extension()
            )),
            audio_path: save_dir.join(format!("audio_{timestamp}.wav")),
        }
    }
}

/// A finished recording found in the save directory.
#[derive(Debug, Clone)]
pub struct RecordingEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl RecordingEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Lists video files in `save_dir`, newest name first.
///
/// Names embed a sortable timestamp, so reverse lexical order is reverse
/// chronological order.
///
/// # Errors
/// - If the directory exists but cannot be read
pub fn list_recordings(save_dir: &Path) -> std::io::Result<Vec<RecordingEntry>> {
    if !save_dir.exists() {
        return Ok(Vec::new());
    }

    let extensions = Container::all_extensions();
    let mut entries: Vec<RecordingEntry> = fs::read_dir(save_dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let ext = path.extension()?.to_str()?.to_ascii_lowercase();
            if !extensions.contains(&ext.as_str()) {
                return None;
            }
            let size_bytes = fs::metadata(&path).ok()?.len();
            Some(RecordingEntry { path, size_bytes })
        })
        .collect();

    entries.sort_by_key(|e| std::cmp::Reverse(e.file_name()));
    Ok(entries)
}

/// Sibling path with `suffix` appended to the file stem: `clip.mp4` -> `clip<suffix>.mp4`.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}
