//! Transfer executor: copies one file, times it and writes exactly one log record.

use chrono::Local;
use std::path::Path;
use std::time::Instant;

use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{TransferLogRecord, FAILED_TRANSFER_MILLIS};

/// Append-only sink for transfer records.
///
/// Called once per attempted copy, possibly many times per run.
pub trait TransferLog: Send + Sync {
    fn append(&self, record: &TransferLogRecord) -> Result<(), EngineError>;
}

/// Result of a single file transfer.
#[derive(Debug)]
pub struct TransferOutcome {
    /// Elapsed milliseconds, or `FAILED_TRANSFER_MILLIS`
    pub duration_millis: i64,
    pub error: Option<EngineError>,
}

impl TransferOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Copy `source` to `dest`, overwriting it, and log the attempt.
///
/// Copy failures are returned in the outcome, never as an `Err`: one bad file
/// must not stop the backup. A failing log sink is reported through tracing only.
pub fn transfer(
    job_name: &str,
    source: &Path,
    dest: &Path,
    size: u64,
    log: &dyn TransferLog,
) -> TransferOutcome {
    let timestamp = Local::now();
    let started = Instant::now();

    let outcome = match fs_ops::copy_file_atomic(source, dest) {
        Ok(_) => TransferOutcome {
            duration_millis: started.elapsed().as_millis() as i64,
            error: None,
        },
        Err(e) => {
            tracing::warn!(job = job_name, "copy failed for {}: {}", source.display(), e);
            TransferOutcome {
                duration_millis: FAILED_TRANSFER_MILLIS,
                error: Some(e),
            }
        }
    };

    record(job_name, source, dest, size, outcome.duration_millis, timestamp, log);
    outcome
}

/// Log a file that was never attempted because its directory could not be mirrored.
pub(crate) fn record_unreachable(job_name: &str, source: &Path, dest: &Path, size: u64, log: &dyn TransferLog) {
    record(job_name, source, dest, size, FAILED_TRANSFER_MILLIS, Local::now(), log);
}

fn record(
    job_name: &str,
    source: &Path,
    dest: &Path,
    size: u64,
    duration_millis: i64,
    timestamp: chrono::DateTime<Local>,
    log: &dyn TransferLog,
) {
    let entry = TransferLogRecord {
        timestamp,
        job_name: job_name.to_string(),
        source_path: fs_ops::normalize_for_log(source),
        target_path: fs_ops::normalize_for_log(dest),
        file_size_bytes: size,
        transfer_duration_millis: duration_millis,
    };
    if let Err(e) = log.append(&entry) {
        tracing::error!(job = job_name, "could not write transfer log record: {}", e);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;

    /// In-memory sink for tests.
    #[derive(Default)]
    pub(crate) struct MemoryLog {
        pub records: Mutex<Vec<TransferLogRecord>>,
    }

    impl MemoryLog {
        pub(crate) fn records(&self) -> Vec<TransferLogRecord> {
            self.records.lock().clone()
        }
    }

    impl TransferLog for MemoryLog {
        fn append(&self, record: &TransferLogRecord) -> Result<(), EngineError> {
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    struct BrokenLog;

    impl TransferLog for BrokenLog {
        fn append(&self, _record: &TransferLogRecord) -> Result<(), EngineError> {
            Err(EngineError::NoDataDir)
        }
    }

    #[test]
    fn test_successful_transfer_is_logged() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("a.txt");
        let dst = temp_dir.path().join("b.txt");
        fs::write(&src, b"hello").expect("Failed to write source");

        let log = MemoryLog::default();
        let outcome = transfer("job", &src, &dst, 5, &log);

        assert!(outcome.succeeded());
        assert!(outcome.duration_millis >= 0);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "hello");

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].job_name, "job");
        assert_eq!(records[0].file_size_bytes, 5);
        assert!(!records[0].is_failure());
        assert!(records[0].source_path.ends_with("a.txt"));
        assert!(records[0].target_path.ends_with("b.txt"));
    }

    #[test]
    fn test_failed_transfer_logs_sentinel() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("vanished.txt");
        let dst = temp_dir.path().join("b.txt");

        let log = MemoryLog::default();
        let outcome = transfer("job", &src, &dst, 7, &log);

        assert!(!outcome.succeeded());
        assert_eq!(outcome.duration_millis, FAILED_TRANSFER_MILLIS);
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_failure());
        assert_eq!(records[0].file_size_bytes, 7);
    }

    #[test]
    fn test_broken_log_does_not_fail_transfer() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("a.txt");
        fs::write(&src, b"x").expect("Failed to write source");

        let outcome = transfer("job", &src, &temp_dir.path().join("b.txt"), 1, &BrokenLog);
        assert!(outcome.succeeded());
    }
}
