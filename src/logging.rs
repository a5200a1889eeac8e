//! Structured logging for fluxrec using the tracing crate.
//!
//! Logs go to a daily-rotated file under the XDG state directory, never to the
//! terminal, so the recording status line stays readable. Worker threads log with
//! their thread ids. Only the 7 newest log files are kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;

/// Log files are named `fluxrec.log.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "fluxrec.log";

/// Global non-blocking guard holder to keep the appender alive for the program lifetime.
static APPENDER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initializes the logging system with file-based output.
///
/// Sets up a non-blocking rolling file appender that rotates daily.
/// Log level is controlled by the RUST_LOG environment variable (defaults to "info").
///
/// # Errors
/// - If the log directory cannot be determined or created
/// - If the subscriber initialization fails
pub fn init_logging() -> Result<(), anyhow::Error> {
    let log_dir = get_log_dir()?;

    // Clean up old log files before initializing new logging
    if let Err(e) = cleanup_old_logs(&log_dir) {
        eprintln!("Warning: Failed to cleanup old logs: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Store the guard in a static to keep it alive for the program lifetime
    APPENDER_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Logging already initialized"))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_ansi(false),
        )
        .init();

    tracing::debug!("Logging initialized. Log file: {}", log_dir.display());
    Ok(())
}

/// Log directory: `$XDG_STATE_HOME/fluxrec`, else `~/.local/state/fluxrec`.
///
/// # Errors
/// - If home directory cannot be determined
pub fn log_dir() -> Result<PathBuf, anyhow::Error> {
    match std::env::var_os("XDG_STATE_HOME") {
        Some(xdg_state) if !xdg_state.is_empty() => Ok(PathBuf::from(xdg_state).join("fluxrec")),
        _ => dirs::home_dir()
            .map(|home| home.join(".local/state/fluxrec"))
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory")),
    }
}

fn get_log_dir() -> Result<PathBuf, anyhow::Error> {
    let log_dir = log_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

/// Whether `name` is a dated log file written by the rolling appender.
fn is_dated_log(name: &str) -> bool {
    name.strip_prefix(LOG_FILE_PREFIX)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|date| date.len() == 10 && date.matches('-').count() == 2)
}

/// Removes all but the `MAX_LOG_FILES` most recently modified log files.
///
/// # Errors
/// - If the log directory cannot be read
fn cleanup_old_logs(log_dir: &Path) -> Result<(), anyhow::Error> {
    const MAX_LOG_FILES: usize = 7;

    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_string_lossy().to_string();
            if !is_dated_log(&name) {
                return None;
            }
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            Some((path, modified))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to delete old log file {}: {}", path.display(), e);
        }
    }

    Ok(())
}
