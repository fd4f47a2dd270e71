//! WAL directory management.
//!
//! The WAL directory holds the segment files plus an advisory `LOCK` file:
//!
//! ```text
//! <wal_dir>/
//! ├─ LOCK                          # Advisory lock for single-writer
//! ├─ 00000000_00000000_00000001    # Segment 1
//! ├─ 00000000_00000000_00000002    # Segment 2
//! └─ ...
//! ```
//!
//! The `LOCK` file ensures only one process appends to the log at a time.
//! Readers (recovery scans, inspection tools) do not take the lock.

use crate::error::{WalError, WalResult};
use crate::segment::{parse_segment_file_name, segment_file_name};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// Lists the segment numbers present in a WAL directory, sorted ascending.
///
/// Filenames that do not parse as segment names (such as `LOCK`) are
/// ignored.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub(crate) fn list_segments(path: &Path) -> WalResult<Vec<u32>> {
    let mut segments = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(num) = parse_segment_file_name(name) {
                segments.push(num);
            }
        }
    }

    segments.sort_unstable();
    Ok(segments)
}

/// Manages the WAL directory and its writer lock.
///
/// Only one `WalDir` instance can exist per directory at a time; the
/// exclusive advisory lock enforces the single-writer assumption across
/// processes.
#[derive(Debug)]
pub(crate) struct WalDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl WalDir {
    /// Opens or creates a WAL directory and acquires the writer lock.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` if the path exists and is not a
    /// directory or cannot be created, and `Locked` if another process
    /// holds the lock.
    pub fn open(path: &Path) -> WalResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|_| WalError::DirectoryUnavailable {
                path: path.to_path_buf(),
            })?;
        }

        if !path.is_dir() {
            return Err(WalError::DirectoryUnavailable {
                path: path.to_path_buf(),
            });
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(WalError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the file for segment `num`.
    pub fn segment_path(&self, num: u32) -> PathBuf {
        self.path.join(segment_file_name(num))
    }

    /// Lists the segment numbers present in the directory, sorted.
    pub fn segments(&self) -> WalResult<Vec<u32>> {
        list_segments(&self.path)
    }

    /// Syncs the directory so newly created segment files are durable.
    #[cfg(unix)]
    pub fn sync_directory(&self) -> WalResult<()> {
        // On Unix, fsync on a directory syncs the directory entries
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    /// Syncs the directory so newly created segment files are durable.
    #[cfg(not(unix))]
    pub fn sync_directory(&self) -> WalResult<()> {
        // NTFS journaling covers metadata durability; directory fsync is
        // not supported on Windows
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let wal_path = temp.path().join("wal");

        assert!(!wal_path.exists());

        let dir = WalDir::open(&wal_path).unwrap();
        assert!(wal_path.is_dir());
        assert_eq!(dir.path(), wal_path);
    }

    #[test]
    fn open_fails_on_non_directory() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("not_a_dir");
        std::fs::write(&file_path, b"occupied").unwrap();

        let result = WalDir::open(&file_path);
        assert!(matches!(
            result,
            Err(WalError::DirectoryUnavailable { .. })
        ));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let wal_path = temp.path().join("wal");

        let _dir1 = WalDir::open(&wal_path).unwrap();

        let result = WalDir::open(&wal_path);
        assert!(matches!(result, Err(WalError::Locked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let wal_path = temp.path().join("wal");

        {
            let _dir = WalDir::open(&wal_path).unwrap();
        }

        let _dir2 = WalDir::open(&wal_path).unwrap();
    }

    #[test]
    fn segments_ignores_lock_file() {
        let temp = tempdir().unwrap();
        let wal_path = temp.path().join("wal");

        let dir = WalDir::open(&wal_path).unwrap();
        assert!(dir.segments().unwrap().is_empty());

        std::fs::write(dir.segment_path(1), b"").unwrap();
        std::fs::write(dir.segment_path(2), b"").unwrap();
        std::fs::write(wal_path.join("stray.tmp"), b"").unwrap();

        assert_eq!(dir.segments().unwrap(), vec![1, 2]);
    }
}
