//! Display recent log entries from the application.

use anyhow::anyhow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{log_dir, LOG_FILE_PREFIX};

const DEFAULT_LINES: usize = 50;

/// Prints the tail of the most recent log file.
///
/// # Errors
/// - If the log directory cannot be determined
/// - If log files cannot be read
pub fn handle_logs() -> Result<(), anyhow::Error> {
    let log_dir = log_dir()?;

    if !log_dir.exists() {
        println!("Log directory does not exist yet: {}", log_dir.display());
        println!("Logs will be created when the application runs.");
        return Ok(());
    }

    let Some(log_file) = find_latest_log(&log_dir)? else {
        println!("No log files found in: {}", log_dir.display());
        println!("Run 'fluxrec record' or other commands to generate logs.");
        return Ok(());
    };

    let content =
        fs::read_to_string(&log_file).map_err(|e| anyhow!("Failed to read log file: {e}"))?;
    if content.is_empty() {
        println!("Log file is empty: {}", log_file.display());
        return Ok(());
    }

    let (shown, total) = tail_lines(&content, DEFAULT_LINES);
    println!();
    if shown.len() < total {
        println!("Showing last {} of {} lines:", shown.len(), total);
    } else {
        println!("Showing all {total} lines:");
    }
    println!("Full log file at: {}", log_file.display());
    println!();

    for line in shown {
        println!("{line}");
    }

    Ok(())
}

/// Last `count` lines of `content`, plus the total line count.
fn tail_lines(content: &str, count: usize) -> (Vec<&str>, usize) {
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    let start = total.saturating_sub(count);
    (lines[start..].to_vec(), total)
}

/// Most recently modified `fluxrec.log*` file in `log_dir`.
fn find_latest_log(log_dir: &Path) -> Result<Option<PathBuf>, anyhow::Error> {
    let entries =
        fs::read_dir(log_dir).map_err(|e| anyhow!("Failed to read log directory: {e}"))?;

    let latest = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|path| {
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            Some((path, modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path);

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines() {
        let content = (1..=60).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let (shown, total) = tail_lines(&content, 50);
        assert_eq!(total, 60);
        assert_eq!(shown.len(), 50);
        assert_eq!(shown[0], "11");

        let (shown, total) = tail_lines("a\nb", 50);
        assert_eq!((shown, total), (vec!["a", "b"], 2));
    }

    #[test]
    fn test_find_latest_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_latest_log(dir.path()).unwrap().is_none());

        fs::write(dir.path().join("fluxrec.log.2026-10-18"), "old").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("fluxrec.log.2026-10-19"), "new").unwrap();
        fs::write(dir.path().join("unrelated.txt"), "x").unwrap();

        let latest = find_latest_log(dir.path()).unwrap().unwrap();
        assert!(latest.ends_with("fluxrec.log.2026-10-19"));
    }
}
