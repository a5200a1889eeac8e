//! Lossless trim of a finished recording.

use anyhow::anyhow;
use console::style;
use std::path::Path;
use std::sync::Arc;

use crate::config::FluxConfig;
use crate::recording::{FfmpegTool, PostProcessor};

/// Parses a trim offset: plain seconds (`12.5`), `MM:SS` or `HH:MM:SS`.
pub fn parse_timestamp(text: &str) -> Result<f64, String> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(format!("invalid timestamp '{text}', expected SECONDS, MM:SS or HH:MM:SS"));
    }

    let (seconds, whole_units) = parts.split_last().ok_or_else(|| "empty timestamp".to_string())?;
    let mut total = seconds
        .parse::<f64>()
        .map_err(|e| format!("invalid seconds in '{text}': {e}"))?;
    if !total.is_finite() || total < 0.0 {
        return Err(format!("invalid seconds in '{text}'"));
    }
    if !whole_units.is_empty() && total >= 60.0 {
        return Err(format!("seconds must be below 60 in '{text}'"));
    }

    let mut multiplier = 60.0;
    for unit in whole_units.iter().rev() {
        let value = unit
            .parse::<u32>()
            .map_err(|e| format!("invalid component '{unit}' in '{text}': {e}"))?;
        total += f64::from(value) * multiplier;
        multiplier *= 60.0;
    }
    Ok(total)
}

/// Writes `<name>_trimmed.<ext>` next to `file`.
///
/// # Errors
/// - If the range is invalid or ffmpeg fails
pub fn handle_trim(file: &Path, start_sec: f64, end_sec: f64) -> Result<(), anyhow::Error> {
    let settings = FluxConfig::load()
        .map(|c| c.postprocess.merge_settings())
        .unwrap_or_default();
    let post = PostProcessor::new(Arc::new(FfmpegTool), settings);

    let output = post
        .trim(file, start_sec, end_sec)
        .map_err(|e| anyhow!("{e}"))?;
    println!(
        "{} Trimmed {:.1}s..{:.1}s to {}",
        style("✓").green().bold(),
        start_sec,
        end_sec,
        output.display()
    );
    Ok(())
}
