//! Durable job state: a JSON array of job snapshots.
//!
//! The store keeps the latest snapshot of every job in memory and rewrites
//! the file on each change. Writes are serialized by a mutex and go through a
//! temporary file plus rename, so concurrent notifications from several jobs
//! cannot interleave and a crash never leaves a half-written file.

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::EngineError;
use crate::model::JobSnapshot;
use crate::progress::ProgressListener;

/// Snapshot store backed by a single JSON file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    jobs: Mutex<Vec<JobSnapshot>>,
}

impl StateStore {
    /// Open the store at `path`. A missing file means no jobs yet.
    ///
    /// # Errors
    /// `Serialization` if the file exists but is not a valid snapshot list.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<StateStore, EngineError> {
        let path = path.as_ref().to_path_buf();
        let jobs = load(&path)?;
        Ok(StateStore { path, jobs: Mutex::new(jobs) })
    }

    /// Like [`StateStore::open`], but a corrupt file is moved aside to
    /// `<file>.corrupt` and the store starts empty.
    pub fn open_recovering<P: AsRef<Path>>(path: P) -> Result<StateStore, EngineError> {
        let path = path.as_ref();
        match StateStore::open(path) {
            Err(EngineError::Serialization { source, .. }) => {
                let mut aside = path.as_os_str().to_owned();
                aside.push(".corrupt");
                let aside = PathBuf::from(aside);
                tracing::warn!("state file {} is corrupt ({}), moving it to {}", path.display(), source, aside.display());
                fs::rename(path, &aside).map_err(|e| EngineError::WriteError {
                    path: aside.clone(),
                    source: e,
                })?;
                StateStore::open(path)
            }
            other => other,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored snapshots, in file order.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.lock().clone()
    }

    /// Replace the whole job list.
    pub fn save_all(&self, snapshots: Vec<JobSnapshot>) -> Result<(), EngineError> {
        let mut jobs = self.jobs.lock();
        *jobs = snapshots;
        self.write(&jobs)
    }

    /// Insert or replace the snapshot with the same job name.
    pub fn upsert(&self, snapshot: &JobSnapshot) -> Result<(), EngineError> {
        let mut jobs = self.jobs.lock();
        match jobs.iter_mut().find(|j| j.name == snapshot.name) {
            Some(existing) => *existing = snapshot.clone(),
            None => jobs.push(snapshot.clone()),
        }
        self.write(&jobs)
    }

    /// Drop a job from the store. Returns false if it was not there.
    pub fn remove(&self, name: &str) -> Result<bool, EngineError> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|j| j.name != name);
        if jobs.len() == before {
            return Ok(false);
        }
        self.write(&jobs)?;
        Ok(true)
    }

    /// A progress listener that persists every snapshot it receives.
    pub fn listener(self: &Arc<Self>) -> StoreListener {
        StoreListener { store: Arc::clone(self) }
    }

    fn write(&self, jobs: &[JobSnapshot]) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(jobs).map_err(|e| EngineError::Serialization {
            path: self.path.clone(),
            source: e,
        })?;
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Persists each snapshot into a shared [`StateStore`].
pub struct StoreListener {
    store: Arc<StateStore>,
}

impl ProgressListener for StoreListener {
    fn on_progress(&mut self, snapshot: &JobSnapshot) -> Result<(), EngineError> {
        self.store.upsert(snapshot)
    }
}

/// Read the snapshot list at `path`; a missing file yields an empty list.
pub fn load(path: &Path) -> Result<Vec<JobSnapshot>, EngineError> {
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
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text).map_err(|e| EngineError::Serialization {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write `bytes` to `path` through a sibling temporary file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::fs_ops::ensure_dir(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| EngineError::WriteError {
        path: tmp.clone(),
        source: e,
    })?;
    #[cfg(windows)]
    {
        let _ = fs::remove_file(path);
    }
    fs::rename(&tmp, path).map_err(|e| EngineError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::model::{BackupMode, JobState};

    fn snapshot(name: &str) -> JobSnapshot {
        Job::new(name, "src", "dst", BackupMode::Full)
            .expect("Failed to create job")
            .snapshot()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = StateStore::open(temp_dir.path().join("state.json")).expect("Failed to open");
        assert!(store.snapshots().is_empty());
    }

    #[test]
    fn test_upsert_persists_and_replaces() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("state.json");
        let store = StateStore::open(&path).expect("Failed to open");

        store.upsert(&snapshot("a")).expect("Failed to upsert");
        store.upsert(&snapshot("b")).expect("Failed to upsert");
        let mut updated = snapshot("a");
        updated.state = JobState::Completed;
        updated.progress_percent = 100;
        store.upsert(&updated).expect("Failed to upsert");

        let reloaded = StateStore::open(&path).expect("Failed to reopen").snapshots();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0], updated);
        assert_eq!(reloaded[1].name, "b");
    }

    #[test]
    fn test_remove() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("state.json");
        let store = StateStore::open(&path).expect("Failed to open");
        store.save_all(vec![snapshot("a"), snapshot("b")]).expect("Failed to save");

        assert!(store.remove("a").expect("Failed to remove"));
        assert!(!store.remove("a").expect("Failed to remove"));
        assert_eq!(load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("state.json");
        fs::write(&path, "{ not json").expect("Failed to write");

        assert!(matches!(StateStore::open(&path), Err(EngineError::Serialization { .. })));

        let store = StateStore::open_recovering(&path).expect("Failed to recover");
        assert!(store.snapshots().is_empty());
        assert!(temp_dir.path().join("state.json.corrupt").exists());
    }

    #[test]
    fn test_listener_persists_run_progress() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(&src).expect("Failed to create src");
        fs::write(src.join("f.txt"), b"abc").expect("Failed to write");

        let store = Arc::new(StateStore::open(temp_dir.path().join("state.json")).expect("Failed to open"));
        let mut job = Job::new("job", &src, temp_dir.path().join("dst"), BackupMode::Full).expect("Failed to create");
        job.set_listener(store.listener());
        job.execute(&crate::transfer::tests::MemoryLog::default()).expect("Failed to run");

        let saved = load(store.path()).expect("Failed to load");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].state, JobState::Completed);
        assert_eq!(saved[0].progress_percent, 100);
        assert_eq!(saved[0].total_byte_size, 3);
    }
}
