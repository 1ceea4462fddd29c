//! Backup job lifecycle.
//!
//! A [`Job`] owns its configuration, its live counters and its control plane.
//! `execute` drives one run on the calling thread:
//! - validates the source root and takes the file count/size snapshot
//! - moves to Active and walks the tree (see `walk.rs`)
//! - ends in Completed or Cancelled, notifying the listener at each step
//!
//! Pause, resume and cancel requests come in through [`JobHandle`], usually
//! from another thread, and take effect at the walker's next checkpoint.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::control::{JobControl, JobHandle};
use crate::error::EngineError;
use crate::fs_ops::{self, TreeStats};
use crate::model::{progress_percent, BackupMode, JobSnapshot, JobState};
use crate::progress::ProgressListener;
use crate::strategy::strategy_for;
use crate::transfer::TransferLog;
use crate::walk::WalkEnd;

/// One configured source-to-target backup task.
pub struct Job {
    pub(crate) name: String,
    pub(crate) source_root: PathBuf,
    pub(crate) target_root: PathBuf,
    pub(crate) mode: BackupMode,
    pub(crate) state: JobState,
    pub(crate) total_file_count: u64,
    pub(crate) total_byte_size: u64,
    pub(crate) files_remaining: u64,
    pub(crate) bytes_remaining: u64,
    pub(crate) progress_percent: u8,
    pub(crate) current_source_file: Option<PathBuf>,
    pub(crate) current_target_file: Option<PathBuf>,
    pub(crate) last_action_timestamp: Option<DateTime<Local>>,
    pub(crate) last_run_id: Option<Uuid>,
    pub(crate) control: Arc<JobControl>,
    listener: Option<Box<dyn ProgressListener>>,
}

impl Job {
    /// Create a new idle job.
    ///
    /// Only checks that name and paths are non-empty; whether the source
    /// exists is checked each time the job runs.
    pub fn new<S, T>(name: &str, source_root: S, target_root: T, mode: BackupMode) -> Result<Job, EngineError>
    where
        S: AsRef<Path>,
        T: AsRef<Path>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "job name is empty".to_string(),
            });
        }
        let source_root = source_root.as_ref();
        let target_root = target_root.as_ref();
        if source_root.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "source directory is empty".to_string(),
            });
        }
        if target_root.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "target directory is empty".to_string(),
            });
        }

        Ok(Job {
            name: name.to_string(),
            source_root: source_root.to_path_buf(),
            target_root: target_root.to_path_buf(),
            mode,
            state: JobState::Idle,
            total_file_count: 0,
            total_byte_size: 0,
            files_remaining: 0,
            bytes_remaining: 0,
            progress_percent: 0,
            current_source_file: None,
            current_target_file: None,
            last_action_timestamp: None,
            last_run_id: None,
            control: Arc::new(JobControl::new()),
            listener: None,
        })
    }

    /// Rebuild a job from a persisted snapshot.
    ///
    /// A snapshot taken mid-run (Active or Paused) belongs to a process that
    /// is gone, so the job comes back Idle with its last counters.
    pub fn from_snapshot(snapshot: JobSnapshot) -> Job {
        let state = if snapshot.state.is_running() {
            JobState::Idle
        } else {
            snapshot.state
        };
        let files_remaining = snapshot.files_remaining.min(snapshot.total_file_count);

        Job {
            name: snapshot.name,
            source_root: snapshot.source_root,
            target_root: snapshot.target_root,
            mode: snapshot.mode,
            state,
            total_file_count: snapshot.total_file_count,
            total_byte_size: snapshot.total_byte_size,
            files_remaining,
            bytes_remaining: snapshot.bytes_remaining.min(snapshot.total_byte_size),
            progress_percent: progress_percent(snapshot.total_file_count, files_remaining),
            current_source_file: snapshot.current_source_file,
            current_target_file: snapshot.current_target_file,
            last_action_timestamp: snapshot.last_action_timestamp,
            last_run_id: snapshot.last_run_id,
            control: Arc::new(JobControl::new()),
            listener: None,
        }
    }

    /// Serializable view of the job as it is right now.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            name: self.name.clone(),
            source_root: self.source_root.clone(),
            target_root: self.target_root.clone(),
            mode: self.mode,
            state: self.state,
            total_file_count: self.total_file_count,
            total_byte_size: self.total_byte_size,
            files_remaining: self.files_remaining,
            bytes_remaining: self.bytes_remaining,
            progress_percent: self.progress_percent,
            current_source_file: self.current_source_file.clone(),
            current_target_file: self.current_target_file.clone(),
            last_action_timestamp: self.last_action_timestamp,
            last_run_id: self.last_run_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn mode(&self) -> BackupMode {
        self.mode
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn total_file_count(&self) -> u64 {
        self.total_file_count
    }

    pub fn total_byte_size(&self) -> u64 {
        self.total_byte_size
    }

    pub fn files_remaining(&self) -> u64 {
        self.files_remaining
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_remaining
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn current_source_file(&self) -> Option<&Path> {
        self.current_source_file.as_deref()
    }

    pub fn current_target_file(&self) -> Option<&Path> {
        self.current_target_file.as_deref()
    }

    pub fn last_action_timestamp(&self) -> Option<DateTime<Local>> {
        self.last_action_timestamp
    }

    /// Id of the most recent run that actually started walking.
    pub fn last_run_id(&self) -> Option<Uuid> {
        self.last_run_id
    }

    /// Handle for controlling this job from another thread.
    pub fn handle(&self) -> JobHandle {
        JobHandle::new(Arc::clone(&self.control))
    }

    /// Register the progress listener, replacing any previous one.
    pub fn set_listener<L: ProgressListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    /// Remove and return the current listener.
    pub fn clear_listener(&mut self) -> Option<Box<dyn ProgressListener>> {
        self.listener.take()
    }

    /// Request a pause; only honoured while the job is running and not paused.
    pub fn pause(&self) -> bool {
        self.control.pause()
    }

    /// Release a pause; only honoured while the job is paused.
    pub fn resume(&self) -> bool {
        self.control.resume()
    }

    /// Request cancellation; only honoured while the job is running.
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    /// Run the job to completion or cancellation.
    ///
    /// Returns the state the run ended in: `Completed` or `Cancelled`. When the
    /// source tree holds no files nothing happens at all: state, counters and
    /// `last_run_id` keep their previous values and that state is returned.
    /// Per-file copy failures are written to `log` and do not fail the run.
    ///
    /// # Errors
    /// - configuration problems with the source root, before anything runs
    ///   (the job is left Idle and no notification fires)
    /// - an error returned by the progress listener, which stops the walk and
    ///   puts the job back to Idle with the counters it had reached
    pub fn execute(&mut self, log: &dyn TransferLog) -> Result<JobState, EngineError> {
        if let Err(e) = self.check_source() {
            self.state = JobState::Idle;
            tracing::warn!(job = %self.name, "not starting: {}", e);
            return Err(e);
        }

        let stats = match fs_ops::scan_tree(&self.source_root) {
            Ok(stats) => stats,
            Err(e) => {
                self.state = JobState::Idle;
                return Err(e);
            }
        };
        if stats.file_count == 0 {
            tracing::info!(job = %self.name, "source tree is empty, nothing to do");
            return Ok(self.state);
        }
        self.reset_counters(stats);

        let run_id = Uuid::new_v4();
        self.last_run_id = Some(run_id);
        let span = tracing::info_span!("backup", job = %self.name, run = %run_id);
        let _guard = span.enter();
        tracing::info!(
            mode = %self.mode,
            files = stats.file_count,
            bytes = stats.byte_size,
            "starting {} -> {}",
            self.source_root.display(),
            self.target_root.display()
        );

        let strategy = strategy_for(self.mode);
        self.control.arm();
        self.state = JobState::Active;

        let walked = self.notify().and_then(|_| self.walk(strategy.as_ref(), log));
        self.control.disarm();

        match walked {
            Ok(WalkEnd::Finished) => {
                self.state = JobState::Completed;
                self.progress_percent = 100;
                tracing::info!(files_remaining = self.files_remaining, "completed");
            }
            Ok(WalkEnd::Cancelled) => {
                self.state = JobState::Cancelled;
                tracing::info!(files_remaining = self.files_remaining, "cancelled");
            }
            Err(e) => {
                self.state = JobState::Idle;
                tracing::error!("run aborted: {}", e);
                return Err(e);
            }
        }

        self.notify()?;
        Ok(self.state)
    }

    fn check_source(&self) -> Result<(), EngineError> {
        match std::fs::metadata(&self.source_root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(EngineError::SourceNotADirectory {
                path: self.source_root.clone(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
                path: self.source_root.clone(),
            }),
            Err(e) => Err(EngineError::SourceAccessDenied {
                path: self.source_root.clone(),
                source: e,
            }),
        }
    }

    fn reset_counters(&mut self, stats: TreeStats) {
        self.total_file_count = stats.file_count;
        self.total_byte_size = stats.byte_size;
        self.files_remaining = stats.file_count;
        self.bytes_remaining = stats.byte_size;
        self.progress_percent = 0;
        self.current_source_file = None;
        self.current_target_file = None;
    }

    /// Account for one visited file entry of `size` bytes.
    pub(crate) fn record_visit(&mut self, size: u64) {
        self.files_remaining = self.files_remaining.saturating_sub(1);
        self.bytes_remaining = self.bytes_remaining.saturating_sub(size);
        self.progress_percent = progress_percent(self.total_file_count, self.files_remaining);
    }

    /// Send the current snapshot to the listener, if there is one.
    pub(crate) fn notify(&mut self) -> Result<(), EngineError> {
        if self.listener.is_none() {
            return Ok(());
        }
        let snapshot = self.snapshot();
        if let Some(listener) = self.listener.as_mut() {
            listener.on_progress(&snapshot)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("source_root", &self.source_root)
            .field("target_root", &self.target_root)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("files_remaining", &self.files_remaining)
            .field("total_file_count", &self.total_file_count)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}
