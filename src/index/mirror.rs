//! In-memory mirror of the index
//!
//! Holds the last loaded (and naturally sorted) entry list. A snapshot call
//! only reloads when the file's (modification time, length) stamp differs
//! from the one seen at the previous load.

use super::store::PathIndex;
use crate::error::{IndexError, IndexResult};
use crate::pool::WorkerPool;
use crate::sort::parallel_sort;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Debug, Default)]
struct MirrorState {
    entries: Arc<Vec<String>>,
    stamp: Option<FileStamp>,
    loaded: bool,
}

/// Cached, sorted view of a [`PathIndex`]
#[derive(Debug, Default)]
pub struct IndexMirror {
    state: Mutex<MirrorState>,
}

impl IndexMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entries, reloading only if the file changed
    pub fn snapshot(&self, index: &PathIndex, pool: &WorkerPool) -> IndexResult<Arc<Vec<String>>> {
        let mut state = self.state.lock();
        let stamp = stamp_of(index)?;

        if state.loaded && state.stamp == stamp {
            return Ok(Arc::clone(&state.entries));
        }

        let entries = index.load()?;
        let sorted = parallel_sort(pool, entries)?;
        debug!(entries = sorted.len(), "Index mirror refreshed");

        state.entries = Arc::new(sorted);
        state.stamp = stamp;
        state.loaded = true;
        Ok(Arc::clone(&state.entries))
    }

    /// Force the next snapshot to reload
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.loaded = false;
    }
}

fn stamp_of(index: &PathIndex) -> IndexResult<Option<FileStamp>> {
    match fs::metadata(index.path()) {
        Ok(meta) => Ok(Some(FileStamp {
            modified: meta.modified().ok(),
            len: meta.len(),
        })),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IndexError::Read {
            path: index.path().to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_is_sorted_and_cached() {
        let dir = TempDir::new().unwrap();
        let pool = WorkerPool::new(2).unwrap();
        let index = PathIndex::new(dir.path().join("index.txt"), 100);
        index.save(&["/isos/img10.iso", "/isos/img2.iso"]).unwrap();

        let mirror = IndexMirror::new();
        let first = mirror.snapshot(&index, &pool).unwrap();
        assert_eq!(*first, vec!["/isos/img2.iso", "/isos/img10.iso"]);

        let second = mirror.snapshot(&index, &pool).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_snapshot_reloads_on_change() {
        let dir = TempDir::new().unwrap();
        let pool = WorkerPool::new(2).unwrap();
        let index = PathIndex::new(dir.path().join("index.txt"), 100);
        let mirror = IndexMirror::new();

        assert!(mirror.snapshot(&index, &pool).unwrap().is_empty());

        // Length changes even when the mtime granularity is coarse
        index.save(&["/isos/a.iso"]).unwrap();
        assert_eq!(*mirror.snapshot(&index, &pool).unwrap(), vec!["/isos/a.iso"]);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let dir = TempDir::new().unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let index = PathIndex::new(dir.path().join("index.txt"), 100);
        index.save(&["/isos/a.iso"]).unwrap();

        let mirror = IndexMirror::new();
        let first = mirror.snapshot(&index, &pool).unwrap();
        mirror.invalidate();
        let second = mirror.snapshot(&index, &pool).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }
}
