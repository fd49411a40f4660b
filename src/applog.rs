//! Per-application log files.
//!
//! Every application owns one plain-text log file named `{id}.log` inside
//! the supervisor's log directory. Lifecycle milestones are appended as
//! timestamped lines and spawned process output is redirected into the same
//! file, so the log reads as a single interleaved history. Files that grow
//! beyond a configured size are rotated with a timestamp suffix
//! (e.g. `web.log.20250101-120000`).

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_LOG_MAX_FILES, DEFAULT_LOG_MAX_SIZE, LOG_TIMESTAMP_FORMAT};

// =====
// Rotation
// =====

/// Size-based rotation settings for application log files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationConfig {
    /// Maximum size in bytes before the file is rotated.
    pub max_size: u64,
    /// Number of rotated files to keep per application.
    pub max_files: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_LOG_MAX_SIZE,
            max_files: DEFAULT_LOG_MAX_FILES,
        }
    }
}

impl RotationConfig {
    /// Rotation config with a size threshold given in megabytes.
    #[must_use]
    pub fn with_size_mb(mb: u64) -> Self {
        Self {
            max_size: mb * 1024 * 1024,
            ..Self::default()
        }
    }
}

/// Rotates a log file if it exceeds the configured size.
///
/// The current file is renamed with a UTC timestamp suffix, rotated files
/// beyond `max_files` are deleted, and the caller creates the replacement.
/// Returns `Ok(true)` if rotation occurred.
fn rotate_if_needed(log_path: &Path, config: &RotationConfig) -> Result<bool> {
    let metadata = match fs::metadata(log_path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).context("Failed to get log file metadata"),
    };

    if metadata.len() < config.max_size {
        return Ok(false);
    }

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let rotated_name = format!(
        "{}.{}",
        log_path.file_name().unwrap_or_default().to_string_lossy(),
        timestamp
    );
    let rotated_path = log_path.with_file_name(rotated_name);

    fs::rename(log_path, &rotated_path)
        .with_context(|| format!("Failed to rotate log file to {}", rotated_path.display()))?;

    tracing::info!(
        log = %log_path.display(),
        rotated_to = %rotated_path.display(),
        size_mb = metadata.len() / (1024 * 1024),
        "Rotated log file"
    );

    cleanup_old_rotations(log_path, config.max_files);

    Ok(true)
}

/// Deletes old rotated files, keeping only the most recent ones.
fn cleanup_old_rotations(log_path: &Path, max_files: usize) {
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let log_name = log_path.file_name().unwrap_or_default().to_string_lossy();
    let rotated_prefix = format!("{log_name}.");

    // Collect rotated siblings (matching pattern: {name}.{timestamp})
    // with their modification times.
    let mut rotated_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();

    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let filename = path.file_name().unwrap_or_default().to_string_lossy().into_owned();
            if !filename.starts_with(&rotated_prefix) || path == log_path {
                continue;
            }
            let modified = fs::metadata(&path).and_then(|m| m.modified());
            if let Ok(modified) = modified {
                rotated_files.push((path, modified));
            }
        }
    }

    // Newest first, delete everything beyond the limit.
    rotated_files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in rotated_files.iter().skip(max_files) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to delete old rotated log"
            );
        } else {
            tracing::debug!(path = %path.display(), "Deleted old rotated log");
        }
    }
}

// =====
// Per-application log handle
// =====

/// Writer and reader for per-application log files under one directory.
#[derive(Debug, Clone)]
pub struct AppLog {
    dir: PathBuf,
    rotation: RotationConfig,
}

impl AppLog {
    /// Log handle rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, rotation: RotationConfig) -> Self {
        Self {
            dir: dir.into(),
            rotation,
        }
    }

    /// Path of the log file for one application.
    #[must_use]
    pub fn path(&self, app_id: &str) -> PathBuf {
        self.dir.join(format!("{app_id}.log"))
    }

    /// Appends a timestamped milestone line.
    ///
    /// Logging must never fail the surrounding workflow, so write errors
    /// are reported through tracing and otherwise swallowed.
    pub fn append(&self, app_id: &str, message: &str) {
        if let Err(e) = self.try_append(app_id, message) {
            tracing::warn!(app = %app_id, error = %e, "Failed to write application log");
        }
    }

    fn try_append(&self, app_id: &str, message: &str) -> Result<()> {
        let mut file = self.open_for_output(app_id)?;
        let timestamp = Local::now().format(LOG_TIMESTAMP_FORMAT);
        writeln!(file, "[{timestamp}] {message}")
            .with_context(|| format!("Failed to append to log for {app_id}"))?;
        Ok(())
    }

    /// Opens the log file in append mode for process output redirection,
    /// creating the directory and rotating an oversized file first.
    pub fn open_for_output(&self, app_id: &str) -> Result<File> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory {}", self.dir.display()))?;

        let path = self.path(app_id);
        rotate_if_needed(&path, &self.rotation)?;

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))
    }

    /// Returns the last `max_lines` lines of the log, or a short diagnostic
    /// string when the file is missing or unreadable.
    #[must_use]
    pub fn tail(&self, app_id: &str, max_lines: usize) -> String {
        let path = self.path(app_id);
        if !path.exists() {
            return format!("No log file found at {}", path.display());
        }
        match fs::read(&path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let lines: Vec<&str> = text.lines().collect();
                let start = lines.len().saturating_sub(max_lines);
                lines[start..].join("\n")
            },
            Err(e) => format!("Error reading log: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotation_config_default() {
        let config = RotationConfig::default();
        assert_eq!(config.max_size, 10 * 1024 * 1024); // 10 MB
        assert_eq!(config.max_files, 5);
    }

    #[test]
    fn test_rotation_config_with_size_mb() {
        let config = RotationConfig::with_size_mb(5);
        assert_eq!(config.max_size, 5 * 1024 * 1024);
    }

    #[test]
    fn test_append_creates_timestamped_line() {
        let temp_dir = TempDir::new().unwrap();
        let log = AppLog::new(temp_dir.path(), RotationConfig::default());

        log.append("web", "=== Starting Web ===");
        log.append("web", "Process started with PID: 42");

        let content = fs::read_to_string(log.path("web")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("=== Starting Web ==="));
        assert!(lines[1].ends_with("Process started with PID: 42"));
    }

    #[test]
    fn test_tail_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let log = AppLog::new(temp_dir.path(), RotationConfig::default());

        let output = log.tail("ghost", 100);
        assert!(output.starts_with("No log file found at "));
        assert!(output.ends_with("ghost.log"));
    }

    #[test]
    fn test_tail_returns_last_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log = AppLog::new(temp_dir.path(), RotationConfig::default());

        for i in 0..10 {
            log.append("web", &format!("line {i}"));
        }

        let output = log.tail("web", 3);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("line 7"));
        assert!(lines[2].ends_with("line 9"));
    }

    #[test]
    fn test_tail_shorter_than_limit() {
        let temp_dir = TempDir::new().unwrap();
        let log = AppLog::new(temp_dir.path(), RotationConfig::default());

        log.append("web", "only line");
        let output = log.tail("web", 100);
        assert_eq!(output.lines().count(), 1);
    }

    #[test]
    fn test_rotate_if_needed_no_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("test.log");
        fs::write(&log_file, "Small log content\n").unwrap();

        let config = RotationConfig::with_size_mb(1);
        let rotated = rotate_if_needed(&log_file, &config).unwrap();

        assert!(!rotated);
        assert!(log_file.exists());
    }

    #[test]
    fn test_rotate_if_needed_triggers_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("test.log");
        fs::write(&log_file, "x".repeat(200 * 1024)).unwrap();

        let config = RotationConfig {
            max_size: 100 * 1024, // 100 KB
            max_files: 3,
        };

        let rotated = rotate_if_needed(&log_file, &config).unwrap();
        assert!(rotated);

        // Original file is gone (renamed).
        assert!(!log_file.exists());

        let entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(
            entries[0]
                .file_name()
                .to_string_lossy()
                .starts_with("test.log.")
        );
    }

    #[test]
    fn test_rotate_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("nonexistent.log");

        let rotated = rotate_if_needed(&log_file, &RotationConfig::default()).unwrap();
        assert!(!rotated);
    }

    #[test]
    fn test_cleanup_old_rotations() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("test.log");

        for i in 0..5 {
            let rotated_name = format!("test.log.2024010{i}-120000");
            fs::write(temp_dir.path().join(rotated_name), "old").unwrap();
            // Distinct modification times so the sort is deterministic.
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        cleanup_old_rotations(&log_file, 2);

        let remaining: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("test.log."))
            .collect();
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn test_open_for_output_rotates_oversized_file() {
        let temp_dir = TempDir::new().unwrap();
        let log = AppLog::new(
            temp_dir.path(),
            RotationConfig {
                max_size: 16,
                max_files: 2,
            },
        );

        fs::write(log.path("web"), "x".repeat(64)).unwrap();
        let _file = log.open_for_output("web").unwrap();

        // The oversized file was rotated away and a fresh one opened.
        assert_eq!(fs::metadata(log.path("web")).unwrap().len(), 0);
    }
}
