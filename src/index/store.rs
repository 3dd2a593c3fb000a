//! On-disk index of known image paths
//!
//! The index is a flat text file, one absolute path per line. Every
//! read-modify-write cycle runs under an exclusive `flock` on the file so
//! concurrent saves from other threads or processes never interleave;
//! readers take a shared lock.
//!
//! # Guarantees
//!
//! - No duplicate lines
//! - At most `max_entries` lines; the oldest entries are evicted first
//! - The file is only rewritten when its content actually changes, so its
//!   modification time (which the in-memory mirror keys on) stays put on
//!   no-op saves and prunes

use super::file::LineFile;
use super::format::is_valid_entry;
use super::lock::LockMode;
use crate::error::IndexResult;
use crate::pool::{chunk_ranges, WorkerPool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Default cap on the number of indexed paths
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Result of a save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Entries that were not in the index before
    pub added: usize,

    /// Oldest entries dropped to stay within the cap
    pub evicted: usize,
}

impl SaveReport {
    /// Whether any genuinely new entry was found
    pub fn found_new(&self) -> bool {
        self.added > 0
    }
}

/// Result of a prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Entries whose existence was checked
    pub checked: usize,

    /// Entries dropped because the file is gone
    pub removed: usize,

    /// Entries left in the index
    pub remaining: usize,

    /// Whether the file was rewritten
    pub rewritten: bool,
}

/// Handle to the index file
#[derive(Debug, Clone)]
pub struct PathIndex {
    file: LineFile,
    max_entries: usize,
}

impl PathIndex {
    /// Create a handle; nothing is touched on disk until the first call
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            file: LineFile::new(path.into()),
            max_entries: max_entries.max(1),
        }
    }

    /// Location of the index file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Maximum number of entries kept
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Create the index file (and its directory) if missing
    pub fn ensure_exists(&self) -> IndexResult<()> {
        self.file.open_rw().map(|_| ())
    }

    /// Read all entries in insertion order
    ///
    /// A missing file is an empty index, not an error.
    pub fn load(&self) -> IndexResult<Vec<String>> {
        let Some(file) = self.file.open_existing()? else {
            return Ok(Vec::new());
        };

        let _lock = self.file.lock(&file, LockMode::Shared)?;
        self.file.read_locked(&file)
    }

    /// Add new entries, evicting the oldest ones past the cap
    ///
    /// Entries already present (or invalid) are ignored. When nothing new
    /// remains, the file is left untouched.
    pub fn save<S: AsRef<str>>(&self, new_entries: &[S]) -> IndexResult<SaveReport> {
        let candidates: Vec<&str> = new_entries
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|entry| is_valid_entry(entry))
            .collect();
        if candidates.is_empty() {
            return Ok(SaveReport::default());
        }

        let file = self.file.open_rw()?;
        let _lock = self.file.lock(&file, LockMode::Exclusive)?;

        let mut entries = self.file.read_locked(&file)?;
        let mut known: HashSet<String> = entries.iter().cloned().collect();

        let mut added = 0;
        for candidate in candidates {
            if known.insert(candidate.to_string()) {
                entries.push(candidate.to_string());
                added += 1;
            }
        }

        if added == 0 {
            debug!(path = %self.path().display(), "Index save found nothing new");
            return Ok(SaveReport::default());
        }

        let evicted = entries.len().saturating_sub(self.max_entries);
        if evicted > 0 {
            entries.drain(..evicted);
        }

        self.file.write_locked(&file, &entries)?;

        debug!(
            path = %self.path().display(),
            added,
            evicted,
            total = entries.len(),
            "Index saved"
        );

        Ok(SaveReport { added, evicted })
    }

    /// Drop entries whose files no longer exist
    ///
    /// Existence checks run on the pool without holding the lock. The
    /// rewrite re-reads the file under the exclusive lock, so entries saved
    /// in the meantime survive.
    pub fn prune(&self, pool: &WorkerPool) -> IndexResult<PruneReport> {
        let entries = self.load()?;
        let checked = entries.len();
        if checked == 0 {
            return Ok(PruneReport::default());
        }

        let entries = Arc::new(entries);
        let results = pool.run_bounded(chunk_ranges(checked, pool.size()).into_iter().map(|range| {
            let entries = Arc::clone(&entries);
            move || {
                entries[range]
                    .iter()
                    .filter(|entry| !Path::new(entry.as_str()).exists())
                    .cloned()
                    .collect::<Vec<String>>()
            }
        }));

        let mut missing = HashSet::new();
        for result in results {
            missing.extend(result?);
        }

        if missing.is_empty() {
            debug!(checked, "Prune found no stale entries");
            return Ok(PruneReport {
                checked,
                removed: 0,
                remaining: checked,
                rewritten: false,
            });
        }

        let (removed, remaining) = self.rewrite_without(&missing)?;
        info!(checked, removed, remaining, "Index pruned");

        Ok(PruneReport {
            checked,
            removed,
            remaining,
            rewritten: removed > 0,
        })
    }

    /// Drop specific entries (after a delete or move)
    ///
    /// Returns how many were removed.
    pub fn remove<S: AsRef<str>>(&self, paths: &[S]) -> IndexResult<usize> {
        if paths.is_empty() || !self.path().exists() {
            return Ok(0);
        }
        let drop: HashSet<String> = paths.iter().map(|p| p.as_ref().to_string()).collect();
        Ok(self.rewrite_without(&drop)?.0)
    }

    /// Empty the index
    pub fn clear(&self) -> IndexResult<()> {
        if !self.path().exists() {
            return Ok(());
        }
        let file = self.file.open_rw()?;
        let _lock = self.file.lock(&file, LockMode::Exclusive)?;
        if self.file.truncate_locked(&file)? {
            info!(path = %self.path().display(), "Index cleared");
        }
        Ok(())
    }

    /// Remove `drop` from the file, returning (removed, remaining)
    fn rewrite_without(&self, drop: &HashSet<String>) -> IndexResult<(usize, usize)> {
        let file = self.file.open_rw()?;
        let _lock = self.file.lock(&file, LockMode::Exclusive)?;

        let entries = self.file.read_locked(&file)?;
        let before = entries.len();
        let kept: Vec<String> = entries.into_iter().filter(|e| !drop.contains(e)).collect();
        let removed = before - kept.len();

        if removed > 0 {
            self.file.write_locked(&file, &kept)?;
        }

        Ok((removed, kept.len()))
    }
}
