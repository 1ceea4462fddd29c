//! # BackUP Engine - Backup Job Library
//!
//! A headless engine for personal backup jobs: each job mirrors a source
//! directory tree into a target directory tree, either copying everything
//! (Full) or only what changed since the last copy (Differential).
//!
//! ## Overview
//!
//! - Depth-first mirror copy with per-file copy decisions
//! - Cooperative pause/resume/cancel from any thread via [`JobHandle`]
//! - Progress snapshots pushed to a single replaceable listener
//! - One transfer log record per attempted copy; failed copies never stop a run
//! - JSON persistence of job state and of the daily transfer log
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{BackupMode, Job, JsonDailyLog};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut job = Job::new("documents", "/home/me/docs", "/mnt/backup/docs", BackupMode::Differential)?;
//! let log = JsonDailyLog::new("/var/tmp/backup-logs");
//!
//! job.set_listener(|snapshot: &engine::JobSnapshot| -> Result<(), engine::EngineError> {
//!     println!("{}%", snapshot.progress_percent);
//!     Ok(())
//! });
//!
//! let end_state = job.execute(&log)?;
//! println!("{}: {}", job.name(), end_state);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Value types (BackupMode, JobState, JobSnapshot, TransferLogRecord)
//! - **error**: Error types
//! - **strategy**: Full and Differential copy decisions
//! - **fs_ops**: Low-level filesystem operations
//! - **transfer**: Single-file transfer executor and the log sink trait
//! - **control**: Pause gate and cancel flag
//! - **progress**: Progress listener trait
//! - **job**: Job lifecycle; **walk**: the tree walker behind it
//! - **registry**: Job registry and job selection parsing
//! - **store**: JSON job state file
//! - **journal**: Daily JSON transfer log
//! - **config**: Data directory and configuration file

pub mod model;
pub mod error;
pub mod strategy;
pub mod fs_ops;
pub mod transfer;
pub mod control;
pub mod progress;
pub mod job;
mod walk;
pub mod registry;
pub mod store;
pub mod journal;
pub mod config;

// Re-export main types and functions
pub use model::{BackupMode, FileMetadata, JobSnapshot, JobState, TransferLogRecord, FAILED_TRANSFER_MILLIS};
pub use error::EngineError;
pub use strategy::{strategy_for, CopyStrategy, DifferentialStrategy, FullStrategy};
pub use transfer::{transfer, TransferLog, TransferOutcome};
pub use control::JobHandle;
pub use progress::{ChannelListener, ProgressListener};
pub use job::Job;
pub use registry::{parse_selection, JobRegistry};
pub use store::StateStore;
pub use journal::JsonDailyLog;
pub use config::AppConfig;
