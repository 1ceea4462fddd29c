//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Taking the file count/size snapshot of a source tree
//! - Listing one directory level (files and subdirectories, in listing order)
//! - Copying a file all-or-nothing with modification time preservation
//! - Creating mirrored directories
//! - Rendering paths in the normalized form used by the transfer log
//!
//! Symlinks to files count as files. Symlinks to directories are neither
//! counted nor descended into, in both the snapshot and the listing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::EngineError;

/// Suffix for the temporary file a copy is written to before it is renamed into place.
const PARTIAL_FILE_SUFFIX: &str = ".backup.partial";

/// File count and byte size of a tree, taken once at the start of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub file_count: u64,
    pub byte_size: u64,
}

/// The direct children of one directory, split by kind.
#[derive(Debug, Default)]
pub struct DirListing {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File(u64),
    Dir,
    Other,
}

fn classify(path: &Path, file_type: fs::FileType) -> EntryKind {
    if file_type.is_dir() {
        return EntryKind::Dir;
    }
    if file_type.is_file() || file_type.is_symlink() {
        // Stat through the link; dangling links and links to directories are ignored
        return match fs::metadata(path) {
            Ok(meta) if meta.is_file() => EntryKind::File(meta.len()),
            _ => EntryKind::Other,
        };
    }
    EntryKind::Other
}

/// Count the files and total bytes under `root`.
///
/// Fails only if the root itself cannot be read. Unreadable subdirectories
/// are left out of the snapshot.
pub fn scan_tree(root: &Path) -> Result<TreeStats, EngineError> {
    let mut stats = TreeStats::default();

    for next in WalkDir::new(root).follow_links(false) {
        let entry = match next {
            Ok(e) => e,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(EngineError::EnumerationFailed {
                        path: root.to_path_buf(),
                        source: err.into_io_error().unwrap_or_else(|| {
                            io::Error::new(io::ErrorKind::Other, "walk error")
                        }),
                    });
                }
                tracing::warn!("skipping unreadable entry during scan: {}", err);
                continue;
            }
        };

        if entry.depth() == 0 {
            continue;
        }

        if let EntryKind::File(size) = classify(entry.path(), entry.file_type()) {
            stats.file_count += 1;
            stats.byte_size += size;
        }
    }

    Ok(stats)
}

/// List the direct files and subdirectories of `dir`, in filesystem order.
pub fn list_dir(dir: &Path) -> Result<DirListing, EngineError> {
    let entries = fs::read_dir(dir).map_err(|e| EngineError::EnumerationFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut listing = DirListing::default();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                tracing::warn!("cannot stat {}: {}", path.display(), e);
                continue;
            }
        };

        match classify(&path, file_type) {
            EntryKind::File(_) => listing.files.push(path),
            EntryKind::Dir => listing.dirs.push(path),
            EntryKind::Other => tracing::trace!("ignoring {}", path.display()),
        }
    }

    Ok(listing)
}

/// Create `path` and any missing parents.
///
/// # Errors
/// Returns `DirectoryCreationFailed` if the directory cannot be created or
/// something that is not a directory is in the way.
pub fn ensure_dir(path: &Path) -> Result<(), EngineError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "path exists but is not a directory"),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Removes the partial file on drop unless the copy was committed.
struct PartialFileGuard {
    temp_path: PathBuf,
    committed: bool,
}

impl PartialFileGuard {
    fn new(temp_path: PathBuf) -> Self {
        Self { temp_path, committed: false }
    }

    fn commit(mut self, final_path: &Path) -> io::Result<()> {
        // Windows refuses to rename over an existing file
        #[cfg(windows)]
        {
            let _ = fs::remove_file(final_path);
        }
        fs::rename(&self.temp_path, final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

fn partial_path_for(dst: &Path) -> PathBuf {
    let mut temp = dst.as_os_str().to_owned();
    temp.push(PARTIAL_FILE_SUFFIX);
    PathBuf::from(temp)
}

/// Copy `src` over `dst`, all or nothing, preserving the source modification time.
///
/// The data is written to a sibling partial file which is renamed onto `dst`
/// only once fully written, so `dst` is never left truncated.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_atomic(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_mtime = src_file.metadata().ok().and_then(|m| m.modified().ok());

    let guard = PartialFileGuard::new(partial_path_for(dst));
    let mut tmp_file = fs::File::create(&guard.temp_path).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut tmp_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError { path: dst.to_path_buf(), source: e }
        } else {
            EngineError::ReadError { path: src.to_path_buf(), source: e }
        }
    })?;
    tmp_file.sync_all().map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;
    drop(tmp_file);

    if let Some(mtime) = src_mtime {
        if let Err(e) = filetime::set_file_mtime(&guard.temp_path, filetime::FileTime::from_system_time(mtime)) {
            tracing::debug!("could not preserve mtime for {}: {}", dst.display(), e);
        }
    }

    guard.commit(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    Ok(bytes_copied)
}

/// Render a local path in the stable absolute form used by the transfer log.
///
/// Drive-letter paths become administrative-share UNC paths
/// (`C:\data` -> `\\localhost\C$\data`); paths that are already UNC are kept.
pub fn normalize_for_log(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    to_unc(&absolute.to_string_lossy())
}

/// String-level part of [`normalize_for_log`].
pub fn to_unc(path: &str) -> String {
    if path.starts_with(r"\\") {
        return path.to_string();
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return format!(r"\\localhost\{}${}", &path[..1], &path[2..]);
    }
    path.to_string()
}
