//! Retry an audio merge that failed at the end of a recording.

use anyhow::anyhow;
use console::style;
use std::path::Path;
use std::sync::Arc;

use crate::config::FluxConfig;
use crate::recording::{FfmpegTool, PostProcessor};

/// Muxes `audio` into `video` in place, using the gain and codec from the config file.
///
/// # Errors
/// - If either file is missing or ffmpeg fails; both inputs are left untouched then
pub fn handle_merge(video: &Path, audio: &Path) -> Result<(), anyhow::Error> {
    let settings = FluxConfig::load()
        .map(|c| c.postprocess.merge_settings())
        .unwrap_or_default();
    tracing::info!(
        "Manual merge with gain {} and codec {}",
        settings.gain,
        settings.audio_codec
    );

    PostProcessor::new(Arc::new(FfmpegTool), settings)
        .merge(video, audio)
        .map_err(|e| anyhow!("{e}"))?;

    println!(
        "{} Merged {} into {}",
        style("✓").green().bold(),
        audio.display(),
        video.display()
    );
    Ok(())
}
