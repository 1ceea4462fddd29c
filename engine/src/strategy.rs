//! Copy strategies: the per-file "should this be copied?" decision.

use crate::model::{BackupMode, FileMetadata};

/// Decides, from source and target metadata alone, whether a file gets copied.
pub trait CopyStrategy: Send + Sync {
    fn should_copy(&self, source: &FileMetadata, target: &FileMetadata) -> bool;
}

/// Copies every file, every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullStrategy;

impl CopyStrategy for FullStrategy {
    fn should_copy(&self, _source: &FileMetadata, _target: &FileMetadata) -> bool {
        true
    }
}

/// Copies a file when the target is missing or strictly older than the source.
///
/// Equal modification times mean "up to date". A side with no readable
/// modification time never counts as newer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferentialStrategy;

impl CopyStrategy for DifferentialStrategy {
    fn should_copy(&self, source: &FileMetadata, target: &FileMetadata) -> bool {
        if !target.exists {
            return true;
        }
        match (source.modified, target.modified) {
            (Some(src), Some(dst)) => src > dst,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Map a backup mode to its strategy. The mapping is fixed for the whole run.
pub fn strategy_for(mode: BackupMode) -> Box<dyn CopyStrategy> {
    match mode {
        BackupMode::Full => Box::new(FullStrategy),
        BackupMode::Differential => Box::new(DifferentialStrategy),
    }
}
