//! Capped most-recent-first line lists
//!
//! Used for folder history (roots previously imported, replayed by
//! `auto-import`) and filter history. On disk the file is kept oldest
//! first, in the same line format as the index, so appending a record
//! touches the tail.

use super::file::LineFile;
use super::format::is_valid_entry;
use super::lock::LockMode;
use crate::error::IndexResult;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entries kept in the folder history
pub const FOLDER_HISTORY_CAPACITY: usize = 50;

/// Entries kept in the filter history
pub const FILTER_HISTORY_CAPACITY: usize = 25;

/// A history file
#[derive(Debug, Clone)]
pub struct LineHistory {
    file: LineFile,
    capacity: usize,
}

impl LineHistory {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            file: LineFile::new(path.into()),
            capacity: capacity.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Entries, most recent first
    pub fn load(&self) -> IndexResult<Vec<String>> {
        let Some(file) = self.file.open_existing()? else {
            return Ok(Vec::new());
        };
        let _lock = self.file.lock(&file, LockMode::Shared)?;

        let mut entries = self.file.read_locked(&file)?;
        entries.reverse();
        entries.truncate(self.capacity);
        Ok(entries)
    }

    /// Record `entry` as the most recent one
    ///
    /// An existing copy moves to the front; the oldest entries past the
    /// capacity are dropped. Invalid entries are ignored.
    pub fn record(&self, entry: &str) -> IndexResult<()> {
        let entry = entry.trim();
        if !is_valid_entry(entry) {
            return Ok(());
        }

        let file = self.file.open_rw()?;
        let _lock = self.file.lock(&file, LockMode::Exclusive)?;

        let mut entries = self.file.read_locked(&file)?;
        if entries.last().map(String::as_str) == Some(entry) {
            return Ok(());
        }
        entries.retain(|e| e != entry);
        entries.push(entry.to_string());
        let excess = entries.len().saturating_sub(self.capacity);
        entries.drain(..excess);

        self.file.write_locked(&file, &entries)?;
        debug!(path = %self.path().display(), entries = entries.len(), "History updated");
        Ok(())
    }
}
