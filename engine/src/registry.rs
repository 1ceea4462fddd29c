//! Job registry: the ordered set of configured jobs, owned by whoever drives them.

use std::path::Path;

use crate::error::EngineError;
use crate::job::Job;
use crate::model::{BackupMode, JobSnapshot};

/// Default cap on the number of configured jobs.
pub const DEFAULT_MAX_JOBS: usize = 5;

/// Ordered collection of jobs with unique names.
///
/// Positions are stable and 1-based indices follow insertion order, which is
/// what command-line job selections refer to.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: Vec<Job>,
    max_jobs: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        JobRegistry::new(DEFAULT_MAX_JOBS)
    }
}

impl JobRegistry {
    pub fn new(max_jobs: usize) -> Self {
        JobRegistry { jobs: Vec::new(), max_jobs }
    }

    /// Rebuild a registry from persisted snapshots.
    ///
    /// Snapshots are restored even past `max_jobs` so nothing saved is lost;
    /// the limit only blocks creating more. Later duplicates of a name are dropped.
    pub fn from_snapshots(snapshots: Vec<JobSnapshot>, max_jobs: usize) -> Self {
        let mut registry = JobRegistry::new(max_jobs);
        for snapshot in snapshots {
            if registry.get(&snapshot.name).is_some() {
                tracing::warn!("ignoring duplicate saved job '{}'", snapshot.name);
                continue;
            }
            registry.jobs.push(Job::from_snapshot(snapshot));
        }
        registry
    }

    /// Create and register a new job.
    ///
    /// # Errors
    /// `JobLimitReached`, `DuplicateJob`, or any validation error from `Job::new`.
    pub fn create<S, T>(&mut self, name: &str, source: S, target: T, mode: BackupMode) -> Result<&mut Job, EngineError>
    where
        S: AsRef<Path>,
        T: AsRef<Path>,
    {
        let job = Job::new(name, source, target, mode)?;
        self.add(job)?;
        let last = self.jobs.len() - 1;
        Ok(&mut self.jobs[last])
    }

    /// Register an existing job.
    pub fn add(&mut self, job: Job) -> Result<(), EngineError> {
        if self.jobs.len() >= self.max_jobs {
            return Err(EngineError::JobLimitReached { max: self.max_jobs });
        }
        if self.get(job.name()).is_some() {
            return Err(EngineError::DuplicateJob {
                name: job.name().to_string(),
            });
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Remove a job by name and hand it back.
    pub fn remove(&mut self, name: &str) -> Result<Job, EngineError> {
        let pos = self
            .jobs
            .iter()
            .position(|j| j.name() == name)
            .ok_or_else(|| EngineError::JobNotFound { key: name.to_string() })?;
        Ok(self.jobs.remove(pos))
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.name() == name)
    }

    /// Job at a 1-based position.
    pub fn by_index(&self, index: usize) -> Option<&Job> {
        index.checked_sub(1).and_then(|i| self.jobs.get(i))
    }

    /// Mutable job at a 1-based position.
    pub fn by_index_mut(&mut self, index: usize) -> Option<&mut Job> {
        let i = index.checked_sub(1)?;
        self.jobs.get_mut(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// Snapshots of every job, in registry order.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.iter().map(Job::snapshot).collect()
    }
}

/// Longest range `parse_selection` will expand.
pub const MAX_SELECTION_LEN: usize = 1024;

/// Parse a job selection into 1-based indices.
///
/// Accepted forms, whitespace ignored: `"2"`, `"1-3"` (inclusive range) and
/// `"1;3;5"`. Indices are not checked against any registry here; a range
/// covering more than [`MAX_SELECTION_LEN`] indices is rejected.
pub fn parse_selection(input: &str) -> Result<Vec<usize>, EngineError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = || EngineError::InvalidSelection { input: input.to_string() };

    if compact.is_empty() {
        return Err(invalid());
    }

    if let Some((start, end)) = compact.split_once('-') {
        let start: usize = start.parse().map_err(|_| invalid())?;
        let end: usize = end.parse().map_err(|_| invalid())?;
        if start > end || end - start >= MAX_SELECTION_LEN {
            return Err(invalid());
        }
        return Ok((start..=end).collect());
    }

    compact
        .split(';')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<usize>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()
        .and_then(|indices| if indices.is_empty() { Err(invalid()) } else { Ok(indices) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobState;

    #[test]
    fn test_create_and_lookup() {
        let mut registry = JobRegistry::default();
        registry.create("docs", "/src/docs", "/dst/docs", BackupMode::Full).expect("Failed to create");
        registry
            .create("photos", "/src/photos", "/dst/photos", BackupMode::Differential)
            .expect("Failed to create");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.by_index(1).unwrap().name(), "docs");
        assert_eq!(registry.by_index(2).unwrap().mode(), BackupMode::Differential);
        assert!(registry.by_index(0).is_none());
        assert!(registry.by_index(3).is_none());
        assert!(registry.get("photos").is_some());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = JobRegistry::default();
        registry.create("docs", "a", "b", BackupMode::Full).expect("Failed to create");
        let err = registry.create("docs", "c", "d", BackupMode::Full).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateJob { .. }));
    }

    #[test]
    fn test_job_limit() {
        let mut registry = JobRegistry::new(2);
        registry.create("a", "s", "t", BackupMode::Full).expect("Failed to create");
        registry.create("b", "s", "t", BackupMode::Full).expect("Failed to create");
        let err = registry.create("c", "s", "t", BackupMode::Full).unwrap_err();
        assert!(matches!(err, EngineError::JobLimitReached { max: 2 }));

        registry.remove("a").expect("Failed to remove");
        registry.create("c", "s", "t", BackupMode::Full).expect("Room again after removal");
        assert_eq!(registry.by_index(1).unwrap().name(), "b");
    }

    #[test]
    fn test_remove_unknown_job() {
        let mut registry = JobRegistry::default();
        assert!(matches!(registry.remove("nope"), Err(EngineError::JobNotFound { .. })));
    }

    #[test]
    fn test_snapshot_round_trip_keeps_order() {
        let mut registry = JobRegistry::default();
        registry.create("one", "s1", "t1", BackupMode::Full).expect("Failed to create");
        registry.create("two", "s2", "t2", BackupMode::Differential).expect("Failed to create");

        let mut snapshots = registry.snapshots();
        snapshots[1].state = JobState::Active;
        snapshots.push(snapshots[0].clone());

        let restored = JobRegistry::from_snapshots(snapshots, 5);
        let names: Vec<&str> = restored.iter().map(|j| j.name()).collect();
        assert_eq!(names, vec!["one", "two"]);
        assert_eq!(restored.get("two").unwrap().state(), JobState::Idle);
    }

    #[test]
    fn test_parse_selection_forms() {
        assert_eq!(parse_selection("2").unwrap(), vec![2]);
        assert_eq!(parse_selection("1-3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_selection(" 1 - 2 ").unwrap(), vec![1, 2]);
        assert_eq!(parse_selection("1;3").unwrap(), vec![1, 3]);
        assert_eq!(parse_selection("4;").unwrap(), vec![4]);
        assert_eq!(parse_selection("1-1024").unwrap().len(), MAX_SELECTION_LEN);
    }

    #[test]
    fn test_parse_selection_rejects_garbage() {
        for input in ["", "a", "3-1", "1-", "1;x", ";", "1-2-3", "1-4000000000"] {
            assert!(parse_selection(input).is_err(), "{input:?} should be rejected");
        }
    }
}
