//! Browsing and deleting recordings in the save directory.

use anyhow::anyhow;
use cliclack::{confirm, intro, outro, outro_cancel};
use console::style;
use std::path::{Path, PathBuf};

use crate::config::FluxConfig;
use crate::recording::list_recordings;

/// Prints the recordings in the save directory, newest first.
///
/// # Errors
/// - If the configuration cannot be loaded or the directory cannot be read
pub fn handle_recordings() -> Result<(), anyhow::Error> {
    let save_dir = FluxConfig::load()?.save_dir();
    let entries = list_recordings(&save_dir)
        .map_err(|e| anyhow!("Failed to read {}: {e}", save_dir.display()))?;

    if entries.is_empty() {
        println!("No recordings in {}", save_dir.display());
        return Ok(());
    }

    println!("Recordings in {}:", style(save_dir.display()).bold());
    println!();
    for entry in &entries {
        println!("  {:<48} {:>9.1} MB", entry.file_name(), entry.size_mb());
    }
    let total: f64 = entries.iter().map(|e| e.size_mb()).sum();
    println!();
    println!("  {} files, {:.1} MB total", entries.len(), total);
    Ok(())
}

/// Resolves `name` to a file: as given if it exists, otherwise inside `save_dir`.
pub fn resolve_recording(save_dir: &Path, name: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Some(direct);
    }
    let in_save_dir = save_dir.join(name);
    in_save_dir.is_file().then_some(in_save_dir)
}

/// Deletes one recording after confirmation.
///
/// # Errors
/// - If the file cannot be found or removed
pub fn handle_delete(name: &str, skip_confirm: bool) -> Result<(), anyhow::Error> {
    let save_dir = FluxConfig::load()?.save_dir();
    let path = resolve_recording(&save_dir, name)
        .ok_or_else(|| anyhow!("No recording named '{name}' in {}", save_dir.display()))?;

    if !skip_confirm {
        intro(style(" delete ").on_white().black())?;
        let confirmed = confirm(format!("Delete {}?", path.display()))
            .initial_value(false)
            .interact()?;
        if !confirmed {
            outro_cancel("Nothing deleted")?;
            return Ok(());
        }
    }

    std::fs::remove_file(&path).map_err(|e| anyhow!("Failed to delete {}: {e}", path.display()))?;
    tracing::info!("Deleted recording {}", path.display());

    if skip_confirm {
        println!("Deleted {}", path.display());
    } else {
        outro(format!("Deleted {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_recording() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("recording_2024-01-01_00-00-00.mp4");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(
            resolve_recording(dir.path(), "recording_2024-01-01_00-00-00.mp4"),
            Some(file.clone())
        );
        assert_eq!(
            resolve_recording(dir.path(), file.to_str().unwrap()),
            Some(file)
        );
        assert_eq!(resolve_recording(dir.path(), "missing.mp4"), None);
    }
}
