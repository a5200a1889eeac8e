//! Configuration file editor command.

use std::process::Command;

/// Opens `fluxrec.toml` in the user's preferred editor.
///
/// Creates the file from the template first if it does not exist yet.
///
/// # Errors
/// - If no editor can be found or executed
pub fn handle_config() -> anyhow::Result<()> {
    let config_path = crate::config::get_config_path()?;
    crate::setup::ensure_config(&config_path)?;

    tracing::info!("Opening config file: {}", config_path.display());

    let editor = find_editor()?;
    tracing::debug!("Using editor: {:?}", editor);

    let (program, args) = editor
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("Editor command is empty"))?;
    let status = Command::new(program)
        .args(args)
        .arg(&config_path)
        .status()
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to open editor '{program}': {e}. Make sure the editor is installed and accessible."
            )
        })?;

    if !status.success() {
        return Err(anyhow::anyhow!(
            "Editor exited with error code: {}",
            status.code().unwrap_or(-1)
        ));
    }

    tracing::info!("Config file edited successfully");
    Ok(())
}

/// Editor command line: `$VISUAL`, then `$EDITOR`, then nano or vi from `PATH`.
///
/// Variables may carry arguments, e.g. `EDITOR="code --wait"`.
fn find_editor() -> anyhow::Result<Vec<String>> {
    for var in ["VISUAL", "EDITOR"] {
        if let Some(command) = std::env::var(var).ok().and_then(|v| split_command(&v)) {
            return Ok(command);
        }
    }

    ["nano", "vi"]
        .into_iter()
        .find(|editor| on_path(editor))
        .map(|editor| vec![editor.to_string()])
        .ok_or_else(|| {
            anyhow::anyhow!("No editor found. Please set the $EDITOR environment variable.")
        })
}

fn split_command(value: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    (!parts.is_empty()).then_some(parts)
}

fn on_path(binary: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("code --wait"),
            Some(vec!["code".to_string(), "--wait".to_string()])
        );
        assert_eq!(split_command("  "), None);
    }
}
