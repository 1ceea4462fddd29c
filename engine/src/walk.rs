//! Tree walker: depth-first mirror copy of a job's source root.
//!
//! Each directory is handled in three steps: make sure its mirror exists on
//! the target side, visit its files in listing order, then queue its
//! subdirectories. An explicit stack replaces recursion so tree depth is
//! bounded by memory, not by the thread's stack.
//!
//! Checkpoints (cancel check, then pause gate) sit before every file,
//! before every directory and once more after the last file.

use chrono::Local;
use std::path::{Path, PathBuf};

use crate::control::GateOutcome;
use crate::error::EngineError;
use crate::fs_ops;
use crate::job::Job;
use crate::model::{FileMetadata, JobState};
use crate::strategy::CopyStrategy;
use crate::transfer::{self, TransferLog};

/// How a walk ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkEnd {
    Finished,
    Cancelled,
}

/// A directory waiting to be walked.
struct PendingDir {
    source: PathBuf,
    target: PathBuf,
    /// False once an ancestor's mirror directory could not be created
    reachable: bool,
}

impl Job {
    pub(crate) fn walk(&mut self, strategy: &dyn CopyStrategy, log: &dyn TransferLog) -> Result<WalkEnd, EngineError> {
        let mut pending = vec![PendingDir {
            source: self.source_root.clone(),
            target: self.target_root.clone(),
            reachable: true,
        }];

        while let Some(dir) = pending.pop() {
            if !self.checkpoint()? {
                return Ok(WalkEnd::Cancelled);
            }

            let listing = match fs_ops::list_dir(&dir.source) {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::warn!("skipping unreadable directory: {}", e);
                    continue;
                }
            };

            let reachable = dir.reachable
                && match fs_ops::ensure_dir(&dir.target) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("{}; files below {} will not be copied", e, dir.source.display());
                        false
                    }
                };

            for file in &listing.files {
                if !self.checkpoint()? {
                    return Ok(WalkEnd::Cancelled);
                }
                let Some(name) = file.file_name() else { continue };
                let target = dir.target.join(name);
                self.visit_file(file, target, reachable, strategy, log)?;
            }

            // Reversed so the stack pops subdirectories in listing order
            for sub in listing.dirs.into_iter().rev() {
                let Some(name) = sub.file_name() else { continue };
                let target = dir.target.join(name);
                pending.push(PendingDir { source: sub, target, reachable });
            }
        }

        // A request that arrived during the last file still takes effect
        if !self.checkpoint()? {
            return Ok(WalkEnd::Cancelled);
        }
        Ok(WalkEnd::Finished)
    }

    /// Returns false once cancellation has been requested. Blocks while paused.
    fn checkpoint(&mut self) -> Result<bool, EngineError> {
        if self.control.is_cancelled() {
            return Ok(false);
        }
        if !self.control.is_paused() {
            return Ok(true);
        }

        self.state = JobState::Paused;
        tracing::info!(files_remaining = self.files_remaining, "paused");
        self.notify()?;

        if self.control.wait_while_paused() == GateOutcome::Cancelled {
            return Ok(false);
        }

        self.state = JobState::Active;
        tracing::info!("resumed");
        self.notify()?;
        Ok(true)
    }

    fn visit_file(
        &mut self,
        source: &Path,
        target: PathBuf,
        reachable: bool,
        strategy: &dyn CopyStrategy,
        log: &dyn TransferLog,
    ) -> Result<(), EngineError> {
        let source_meta = FileMetadata::of(source);
        self.last_action_timestamp = Some(Local::now());

        if !reachable {
            transfer::record_unreachable(&self.name, source, &target, source_meta.size, log);
        } else if strategy.should_copy(&source_meta, &FileMetadata::of(&target)) {
            let outcome = transfer::transfer(&self.name, source, &target, source_meta.size, log);
            tracing::trace!(ms = outcome.duration_millis, "copied {}", source.display());
        } else {
            tracing::debug!("up to date: {}", source.display());
        }

        self.current_source_file = Some(source.to_path_buf());
        self.current_target_file = Some(target);
        self.record_visit(source_meta.size);
        self.notify()
    }
}
