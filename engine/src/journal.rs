//! Daily JSON transfer log.
//!
//! Records are grouped by local date into `<dir>/YYYY-MM-DD.json`, each file
//! holding an indented JSON array. Appends read the day's file, add the record
//! and rewrite it; a mutex keeps appends from the same process in order.

use chrono::NaiveDate;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::model::TransferLogRecord;
use crate::store::write_atomic;
use crate::transfer::TransferLog;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Transfer log stored as one JSON file per day.
#[derive(Debug)]
pub struct JsonDailyLog {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonDailyLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        JsonDailyLog {
            dir: dir.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `day`'s records.
    pub fn file_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", day.format(DAY_FORMAT)))
    }

    /// Records logged on `day`, oldest first. Empty if nothing was logged.
    pub fn read_day(&self, day: NaiveDate) -> Result<Vec<TransferLogRecord>, EngineError> {
        read_records(&self.file_for(day))
    }

    /// Days that have a log file, oldest first.
    pub fn days(&self) -> Result<Vec<NaiveDate>, EngineError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EngineError::EnumerationFailed {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut days: Vec<NaiveDate> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".json")?.to_string();
                NaiveDate::parse_from_str(&stem, DAY_FORMAT).ok()
            })
            .collect();
        days.sort();
        Ok(days)
    }
}

impl TransferLog for JsonDailyLog {
    fn append(&self, record: &TransferLogRecord) -> Result<(), EngineError> {
        let _guard = self.lock.lock();
        let path = self.file_for(record.timestamp.date_naive());
        let mut records = read_records(&path)?;
        records.push(record.clone());

        let json = serde_json::to_string_pretty(&records).map_err(|e| EngineError::Serialization {
            path: path.clone(),
            source: e,
        })?;
        write_atomic(&path, json.as_bytes())
    }
}

fn read_records(path: &Path) -> Result<Vec<TransferLogRecord>, EngineError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(EngineError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_str(&text).map_err(|e| EngineError::Serialization {
        path: path.to_path_buf(),
        source: e,
    })
}
