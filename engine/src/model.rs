//! Core data model for backup jobs.
//!
//! This module defines the value types shared by the engine and its collaborators:
//! - BackupMode, JobState: enums controlling and describing a job
//! - FileMetadata: what a copy strategy gets to see about a file
//! - JobSnapshot: serializable view of a job (persisted and sent to listeners)
//! - TransferLogRecord: one attempted file transfer

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

use crate::error::EngineError;

/// Duration recorded in the transfer log when a copy failed.
pub const FAILED_TRANSFER_MILLIS: i64 = -1;

/// How a job decides which files to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupMode {
    /// Copy every file on every run
    Full,
    /// Copy files missing from the target or newer than the target copy
    Differential,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Full => write!(f, "Full"),
            BackupMode::Differential => write!(f, "Differential"),
        }
    }
}

impl FromStr for BackupMode {
    type Err = EngineError;

    /// Accepts the mode names and the menu codes `1` (full) and `2` (differential).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "1" => Ok(BackupMode::Full),
            "differential" | "diff" | "2" => Ok(BackupMode::Differential),
            _ => Err(EngineError::UnsupportedMode { value: s.to_string() }),
        }
    }
}

impl TryFrom<u8> for BackupMode {
    type Error = EngineError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(BackupMode::Full),
            2 => Ok(BackupMode::Differential),
            other => Err(EngineError::UnsupportedMode { value: other.to_string() }),
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Configured, not running
    Idle,
    /// Traversal in progress
    Active,
    /// Traversal blocked at the pause gate
    Paused,
    /// Stopped early on request
    Cancelled,
    /// Traversal finished normally
    Completed,
}

impl JobState {
    /// True while a worker owns the job's traversal.
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Active | JobState::Paused)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Metadata a copy strategy bases its decision on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileMetadata {
    pub exists: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileMetadata {
    /// Metadata for a path that is not there.
    pub fn missing() -> Self {
        FileMetadata::default()
    }

    /// Stat `path`, following symlinks. Any error reads as "missing".
    pub fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => FileMetadata::from(&meta),
            Err(_) => FileMetadata::missing(),
        }
    }
}

impl From<&std::fs::Metadata> for FileMetadata {
    fn from(meta: &std::fs::Metadata) -> Self {
        FileMetadata {
            exists: true,
            size: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

/// Serializable view of a job: its configuration plus last-known progress.
///
/// This is what the state store persists and what progress listeners receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub name: String,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub mode: BackupMode,
    pub state: JobState,
    pub total_file_count: u64,
    pub total_byte_size: u64,
    pub files_remaining: u64,
    pub bytes_remaining: u64,
    pub progress_percent: u8,
    #[serde(default)]
    pub current_source_file: Option<PathBuf>,
    #[serde(default)]
    pub current_target_file: Option<PathBuf>,
    #[serde(default)]
    pub last_action_timestamp: Option<DateTime<Local>>,
    /// Identifier of the most recent run, if the job ever ran
    #[serde(default)]
    pub last_run_id: Option<Uuid>,
}

/// One attempted file transfer, as written to the transfer log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLogRecord {
    pub timestamp: DateTime<Local>,
    pub job_name: String,
    /// Normalized (UNC-style) source path
    pub source_path: String,
    /// Normalized (UNC-style) target path
    pub target_path: String,
    pub file_size_bytes: u64,
    /// Elapsed milliseconds, or `FAILED_TRANSFER_MILLIS` if the copy failed
    pub transfer_duration_millis: i64,
}

impl TransferLogRecord {
    /// True if this record describes a failed copy.
    pub fn is_failure(&self) -> bool {
        self.transfer_duration_millis < 0
    }
}

/// Progress percentage for `remaining` out of `total` files.
pub fn progress_percent(total: u64, remaining: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = 1.0 - (remaining.min(total) as f64 / total as f64);
    (done * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("full".parse::<BackupMode>().unwrap(), BackupMode::Full);
        assert_eq!("Differential".parse::<BackupMode>().unwrap(), BackupMode::Differential);
        assert_eq!(" diff ".parse::<BackupMode>().unwrap(), BackupMode::Differential);
        assert_eq!("1".parse::<BackupMode>().unwrap(), BackupMode::Full);
        assert_eq!(BackupMode::try_from(2u8).unwrap(), BackupMode::Differential);

        let err = "incremental".parse::<BackupMode>().unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedMode { .. }));
        assert!(BackupMode::try_from(0u8).is_err());
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(3, 3), 0);
        assert_eq!(progress_percent(3, 2), 33);
        assert_eq!(progress_percent(3, 1), 67);
        assert_eq!(progress_percent(3, 0), 100);
        // Remaining above total is clamped rather than underflowing
        assert_eq!(progress_percent(2, 5), 0);
    }

    #[test]
    fn test_state_helpers() {
        assert!(JobState::Paused.is_running());
        assert!(!JobState::Idle.is_running());
    }

    #[test]
    fn test_missing_file_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let meta = FileMetadata::of(&temp_dir.path().join("nope"));
        assert!(!meta.exists);
        assert_eq!(meta.modified, None);
    }
}
