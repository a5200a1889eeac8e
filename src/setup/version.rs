//! Config file version tracking.
//!
//! The first line of `fluxrec.toml` records which release wrote it. When the binary is
//! newer, the template comments may have changed, so setup refreshes the version line.

use anyhow::anyhow;
use regex::Regex;
use std::fmt;
use std::path::Path;

/// Current application version from Cargo.toml
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `major.minor.patch`
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConfigVersion(u32, u32, u32);

impl ConfigVersion {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let numbers = text
            .trim()
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| anyhow!("Invalid version component '{part}' in '{text}'"))
            })
            .collect::<anyhow::Result<Vec<u32>>>()?;
        match numbers.as_slice() {
            [major, minor, patch] => Ok(Self(*major, *minor, *patch)),
            _ => Err(anyhow!(
                "Invalid version format: '{text}'. Expected 'major.minor.patch'"
            )),
        }
    }

    pub fn current() -> anyhow::Result<Self> {
        Self::parse(CURRENT_VERSION)
    }
}

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// What startup has to do with the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupAction {
    /// No file yet: write the template.
    Create,
    /// File written by an older release, or with no version line.
    Refresh { from: Option<String> },
    UpToDate,
}

/// Version recorded on the first line of `content`, if any.
///
/// The line must start with `config_version`; a commented-out line does not count.
pub fn read_config_version(content: &str) -> anyhow::Result<Option<String>> {
    let Some(first_line) = content.lines().next() else {
        return Ok(None);
    };
    let regex = Regex::new(r#"^\s*config_version\s*=\s*"([^"]+)""#)?;
    Ok(regex.captures(first_line).map(|caps| caps[1].to_string()))
}

/// Decides whether setup has to run for the file at `config_path`.
///
/// # Errors
/// - If the file exists but cannot be read
/// - If its version line is malformed
pub fn check_setup_needed(config_path: &Path) -> anyhow::Result<SetupAction> {
    if !config_path.exists() {
        return Ok(SetupAction::Create);
    }
    let content = std::fs::read_to_string(config_path)?;
    let Some(found) = read_config_version(&content)? else {
        return Ok(SetupAction::Refresh { from: None });
    };

    let file_version = ConfigVersion::parse(&found)?;
    let current = ConfigVersion::current()?;
    if file_version < current {
        Ok(SetupAction::Refresh { from: Some(found) })
    } else {
        if file_version > current {
            tracing::warn!(
                "Config version {} is newer than app version {}",
                file_version,
                current
            );
        }
        Ok(SetupAction::UpToDate)
    }
}

/// Rewrites `content` so its first line records the current version.
pub fn with_current_version(content: &str) -> String {
    let version_line = format!(r#"config_version = "{CURRENT_VERSION}""#);
    let body: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("config_version"))
        .collect();
    if body.is_empty() {
        version_line
    } else {
        format!("{}\n{}", version_line, body.join("\n"))
    }
}

/// Puts the current version on the first line of the config file, keeping the rest.
pub fn update_config_version(config_path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_path)?;
    std::fs::write(config_path, with_current_version(&content))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_order() {
        let old = ConfigVersion::parse("0.0.9").unwrap();
        let new = ConfigVersion::parse(" 0.1.0 ").unwrap();
        assert!(old < new);
        assert_eq!(new.to_string(), "0.1.0");
        assert!(ConfigVersion::parse("0.1").is_err());
        assert!(ConfigVersion::parse("0.1.x").is_err());
        assert!(ConfigVersion::parse("1.2.3.4").is_err());
    }

    #[test]
    fn test_read_version_first_line_only() {
        assert_eq!(
            read_config_version("config_version = \"0.1.0\"\n[recording]\n").unwrap(),
            Some("0.1.0".to_string())
        );
        assert_eq!(read_config_version("# config_version = \"0.1.0\"\n").unwrap(), None);
        assert_eq!(read_config_version("[a]\nconfig_version = \"0.1.0\"\n").unwrap(), None);
    }

    #[test]
    fn test_setup_actions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fluxrec.toml");
        assert_eq!(check_setup_needed(&path).unwrap(), SetupAction::Create);

        std::fs::write(&path, "[recording]\naudio = true\n").unwrap();
        assert_eq!(
            check_setup_needed(&path).unwrap(),
            SetupAction::Refresh { from: None }
        );

        std::fs::write(&path, "config_version = \"0.0.1\"\n[recording]\n").unwrap();
        assert_eq!(
            check_setup_needed(&path).unwrap(),
            SetupAction::Refresh {
                from: Some("0.0.1".to_string())
            }
        );

        update_config_version(&path).unwrap();
        assert_eq!(check_setup_needed(&path).unwrap(), SetupAction::UpToDate);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("[recording]"));
        assert_eq!(content.matches("config_version").count(), 1);
    }
}
