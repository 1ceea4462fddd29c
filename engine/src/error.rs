//! Error types for the backup engine.
//!
//! `EngineError` covers job-level problems: bad configuration, an unreadable
//! source root, persistence failures and listener failures. Per-file copy
//! failures never surface here; they are recorded in the transfer log with a
//! negative duration and the run carries on.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a job from running or a collaborator from doing its work.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source path exists but is not a directory
    #[error("Source is not a directory: {}", path.display())]
    SourceNotADirectory { path: PathBuf },

    /// Source directory is not accessible (permissions)
    #[error("Source directory access denied: {}", path.display())]
    SourceAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A required job field is empty or malformed
    #[error("Invalid job configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Backup mode value outside {Full, Differential}
    #[error("Unsupported backup mode: {value}")]
    UnsupportedMode { value: String },

    /// A job with this name already exists in the registry
    #[error("A job named '{name}' already exists")]
    DuplicateJob { name: String },

    /// The registry already holds the configured maximum number of jobs
    #[error("Job limit reached ({max} jobs)")]
    JobLimitReached { max: usize },

    /// No job matches the given name or index
    #[error("Job not found: {key}")]
    JobNotFound { key: String },

    /// Job selection string could not be parsed
    #[error("Invalid job selection '{input}'")]
    InvalidSelection { input: String },

    /// Failed to read from source file
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to destination file
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// State file or log file could not be (de)serialized
    #[error("Corrupt data in {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file could not be parsed
    #[error("Invalid configuration file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// No data directory could be determined for this platform
    #[error("Unable to determine a data directory")]
    NoDataDir,

    /// A progress listener refused an update
    #[error("Progress listener failed: {message}")]
    Listener { message: String },
}

impl EngineError {
    /// True for errors caused by how the job was configured rather than by I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::SourceNotADirectory { .. }
                | Self::InvalidConfig { .. }
                | Self::UnsupportedMode { .. }
                | Self::DuplicateJob { .. }
                | Self::JobLimitReached { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(EngineError::UnsupportedMode { value: "incremental".into() }.is_configuration());
        assert!(EngineError::JobLimitReached { max: 5 }.is_configuration());
        assert!(!EngineError::NoDataDir.is_configuration());
    }
}
