//! Locked access to line-format files
//!
//! The index and the history files share one open/lock/read/write path.
//! Readers hold a shared `flock`; every read-modify-write cycle holds the
//! exclusive one from the read through the rewrite.

use super::format::{parse_bytes, render_lines};
use super::lock::{FileLock, LockFailure, LockMode};
use crate::error::{IndexError, IndexResult};
use memmap2::Mmap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long to wait for another holder of the lock
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A line-format file on disk
#[derive(Debug, Clone)]
pub(super) struct LineFile {
    path: PathBuf,
}

impl LineFile {
    pub(super) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    /// Open for reading; `None` when the file does not exist
    pub(super) fn open_existing(&self) -> IndexResult<Option<File>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.open_error(&e)),
        }
    }

    /// Open for read-modify-write, creating the file and its directory
    pub(super) fn open_rw(&self) -> IndexResult<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.open_error(&e))?;
            }
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.open_error(&e))
    }

    pub(super) fn lock<'f>(&self, file: &'f File, mode: LockMode) -> IndexResult<FileLock<'f>> {
        FileLock::acquire(file, mode, LOCK_TIMEOUT).map_err(|failure| match failure {
            LockFailure::Contended => IndexError::LockContention {
                path: self.path.clone(),
            },
            LockFailure::Io(e) => self.open_error(&e),
        })
    }

    /// Read every valid line; the caller holds a lock
    pub(super) fn read_locked(&self, file: &File) -> IndexResult<Vec<String>> {
        let len = file.metadata().map_err(|e| self.read_error(&e))?.len();
        if len == 0 {
            return Ok(Vec::new());
        }

        // SAFETY: cooperating writers only modify the file under the
        // exclusive lock, which cannot be granted while ours is held, and
        // the mapping is dropped before this function returns.
        let map = unsafe { Mmap::map(file) }.map_err(|e| self.read_error(&e))?;
        Ok(parse_bytes(&map))
    }

    /// Replace the whole content; the caller holds the exclusive lock
    pub(super) fn write_locked(&self, file: &File, entries: &[String]) -> IndexResult<()> {
        let content = render_lines(entries);
        let mut writer = file;
        writer
            .set_len(0)
            .and_then(|_| writer.seek(SeekFrom::Start(0)))
            .and_then(|_| writer.write_all(content.as_bytes()))
            .and_then(|_| writer.sync_data())
            .map_err(|e| self.write_error(&e))
    }

    /// Empty the file; returns whether it had content
    pub(super) fn truncate_locked(&self, file: &File) -> IndexResult<bool> {
        let len = file.metadata().map_err(|e| self.write_error(&e))?.len();
        if len == 0 {
            return Ok(false);
        }
        file.set_len(0).map_err(|e| self.write_error(&e))?;
        Ok(true)
    }

    fn open_error(&self, e: &io::Error) -> IndexError {
        IndexError::Open {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }

    fn read_error(&self, e: &io::Error) -> IndexError {
        IndexError::Read {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }

    fn write_error(&self, e: &io::Error) -> IndexError {
        IndexError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}
