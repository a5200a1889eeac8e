//! First-run setup and config migration.
//!
//! Writes the default configuration on first run and keeps the file's version line
//! in step with the binary afterwards.

pub mod version;

use anyhow::anyhow;
use std::path::Path;

use version::{SetupAction, CURRENT_VERSION};

/// Embedded default configuration template.
const DEFAULT_CONFIG: &str = include_str!("../../environments/fluxrec.toml");

/// Writes the default config file, prefixed with the current version.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub fn run_setup(config_path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let full_config = format!("config_version = \"{CURRENT_VERSION}\"\n{DEFAULT_CONFIG}");
    std::fs::write(config_path, full_config)?;
    tracing::info!("Default configuration written to {}", config_path.display());
    Ok(())
}

/// Creates or migrates the config file at `config_path` as needed.
///
/// Called early in startup, before any command that reads the config.
///
/// # Errors
/// - If the config file cannot be inspected or written
pub fn ensure_config(config_path: &Path) -> anyhow::Result<()> {
    match version::check_setup_needed(config_path)? {
        SetupAction::Create => {
            run_setup(config_path).map_err(|e| {
                tracing::error!("Setup failed: {e}");
                anyhow!("Setup failed: {e}")
            })?;
        }
        SetupAction::Refresh { from } => {
            tracing::info!(
                "Migrating config from version {} to {}",
                from.as_deref().unwrap_or("unknown (legacy config)"),
                CURRENT_VERSION
            );
            version::update_config_version(config_path).map_err(|e| {
                tracing::error!("Failed to update config version: {e}");
                anyhow!("Failed to update config version: {e}")
            })?;
        }
        SetupAction::UpToDate => {
            tracing::debug!("Config version up to date ({})", CURRENT_VERSION);
        }
    }
    Ok(())
}
