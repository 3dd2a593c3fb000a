//! Recursive image discovery
//!
//! Each root is walked depth-first with `walkdir` on one pool worker,
//! without following symlinks. Matches are collected in a local buffer
//! and flushed to the shared result every [`FLUSH_BATCH`] paths, so
//! workers touch the shared mutex rarely.
//! Filesystem errors never stop a walk; they are collected as messages.

use crate::cancel::CancelFlag;
use crate::error::WorkerError;
use crate::ops::ImageFormat;
use crate::pool::WorkerPool;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Files smaller than this are ignored by default (5 MiB)
pub const DEFAULT_MIN_SIZE: u64 = 5 * 1024 * 1024;

/// Matches buffered per worker before taking the shared lock
const FLUSH_BATCH: usize = 100;

/// Message added to the error set when a walk is cancelled
pub const INTERRUPTED_MARKER: &str = "Traversal interrupted by user";

/// What to look for
#[derive(Debug, Clone)]
pub struct TraverseOptions {
    /// Allowed extensions, lowercase, without the dot
    pub extensions: Vec<String>,

    /// Minimum file size in bytes
    pub min_size: u64,

    /// Deepest directory level to descend into (`None` = unlimited)
    pub max_depth: Option<usize>,

    /// Paths matching any of these are skipped, directories included
    pub exclude: Vec<Regex>,
}

impl TraverseOptions {
    /// ISO images
    pub fn iso() -> Self {
        Self::convertible(ImageFormat::Iso)
    }

    /// Images of `format` (BIN and IMG are searched together)
    pub fn convertible(format: ImageFormat) -> Self {
        Self {
            extensions: format
                .family()
                .iter()
                .map(|f| f.extension().to_string())
                .collect(),
            min_size: DEFAULT_MIN_SIZE,
            max_depth: None,
            exclude: Vec::new(),
        }
    }

    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<Regex>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Whether an existing regular file would be picked up by a walk
    ///
    /// Depth is not checked.
    pub fn qualifies(&self, path: &Path) -> bool {
        let Some(path_str) = path.to_str() else {
            return false;
        };
        self.extension_matches(path)
            && !self.is_excluded(path_str)
            && fs::metadata(path).map_or(false, |m| m.is_file() && m.len() >= self.min_size)
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(path))
    }

    fn extension_matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

/// Outcome of a walk
#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    /// Matching absolute paths, deduplicated, in discovery order
    pub paths: Vec<String>,

    /// Formatted per-path error messages
    pub errors: BTreeSet<String>,

    /// Whether the walk stopped early on cancellation
    pub interrupted: bool,

    /// Directories read
    pub dirs: u64,

    /// Wall time
    pub duration: Duration,
}

/// State shared by every root of one traversal
#[derive(Default)]
struct Shared {
    paths: Mutex<Vec<String>>,
    errors: Mutex<BTreeSet<String>>,
    dirs: AtomicU64,
}

impl Shared {
    fn flush(&self, buffer: &mut Vec<String>) {
        if !buffer.is_empty() {
            self.paths.lock().append(buffer);
        }
    }

    fn error(&self, message: String) {
        self.errors.lock().insert(message);
    }
}

/// Parallel directory walker
#[derive(Debug, Clone)]
pub struct Traverser {
    options: Arc<TraverseOptions>,
    cancel: CancelFlag,
}

impl Traverser {
    pub fn new(options: TraverseOptions, cancel: CancelFlag) -> Self {
        Self {
            options: Arc::new(options),
            cancel,
        }
    }

    /// Walk a single root on the calling thread
    pub fn traverse(&self, root: &Path) -> TraversalResult {
        let start = Instant::now();
        let shared = Shared::default();
        walk_root(root, &self.options, &self.cancel, &shared);
        self.finish(shared, start)
    }

    /// Walk every root, one pool task per root
    pub fn traverse_roots(&self, pool: &WorkerPool, roots: &[PathBuf]) -> Result<TraversalResult, WorkerError> {
        let start = Instant::now();
        let shared = Arc::new(Shared::default());

        let results = pool.run_bounded(roots.iter().cloned().map(|root| {
            let shared = Arc::clone(&shared);
            let options = Arc::clone(&self.options);
            let cancel = self.cancel.clone();
            move || walk_root(&root, &options, &cancel, &shared)
        }));
        for result in results {
            result?;
        }

        let shared = Arc::try_unwrap(shared).unwrap_or_else(|arc| Shared {
            paths: Mutex::new(arc.paths.lock().clone()),
            errors: Mutex::new(arc.errors.lock().clone()),
            dirs: AtomicU64::new(arc.dirs.load(Ordering::Relaxed)),
        });
        Ok(self.finish(shared, start))
    }

    fn finish(&self, shared: Shared, start: Instant) -> TraversalResult {
        let interrupted = self.cancel.is_cancelled();
        let mut errors = shared.errors.into_inner();
        if interrupted {
            errors.insert(INTERRUPTED_MARKER.to_string());
        }

        let mut seen = HashSet::new();
        let paths: Vec<String> = shared
            .paths
            .into_inner()
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();

        let result = TraversalResult {
            paths,
            errors,
            interrupted,
            dirs: shared.dirs.into_inner(),
            duration: start.elapsed(),
        };

        info!(
            found = result.paths.len(),
            dirs = result.dirs,
            errors = result.errors.len(),
            interrupted,
            duration_ms = result.duration.as_millis() as u64,
            "Traversal completed"
        );

        result
    }
}

/// Depth-first walk of one root
fn walk_root(root: &Path, options: &TraverseOptions, cancel: &CancelFlag, shared: &Shared) {
    let root = match fs::canonicalize(root) {
        Ok(root) => root,
        Err(e) => {
            shared.error(format!("Error accessing '{}': {}", root.display(), e));
            return;
        }
    };

    debug!(root = %root.display(), "Walking root");

    // Files inside a directory at depth `d` sit at walkdir depth `d + 1`
    let max_depth = options.max_depth.map_or(usize::MAX, |max| max.saturating_add(1));
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || keep_entry(entry, options, shared));

    let mut buffer: Vec<String> = Vec::with_capacity(FLUSH_BATCH);

    for entry in walker {
        if cancel.is_cancelled() {
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                shared.error(walk_error_message(&e));
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if entry.depth() < max_depth {
                shared.dirs.fetch_add(1, Ordering::Relaxed);
            }
        } else if file_type.is_file() {
            consider_file(&entry, options, shared, &mut buffer);
            if buffer.len() >= FLUSH_BATCH {
                shared.flush(&mut buffer);
            }
        }
    }

    shared.flush(&mut buffer);
}

/// Exclusion and UTF-8 check, applied before descending
fn keep_entry(entry: &DirEntry, options: &TraverseOptions, shared: &Shared) -> bool {
    match entry.path().to_str() {
        Some(path) => !options.is_excluded(path),
        None => {
            shared.error(format!("Skipping non-UTF-8 path '{}'", entry.path().display()));
            false
        }
    }
}

fn walk_error_message(err: &walkdir::Error) -> String {
    let reason = err
        .io_error()
        .map_or_else(|| err.to_string(), |io| io.to_string());
    match err.path() {
        Some(path) => format!("Error accessing '{}': {}", path.display(), reason),
        None => reason,
    }
}

fn consider_file(entry: &DirEntry, options: &TraverseOptions, shared: &Shared, buffer: &mut Vec<String>) {
    let path = entry.path();
    if !options.extension_matches(path) {
        return;
    }
    let Some(path_str) = path.to_str() else {
        return;
    };

    match entry.metadata() {
        Ok(meta) if meta.len() >= options.min_size => buffer.push(path_str.to_string()),
        Ok(_) => {}
        Err(e) => shared.error(walk_error_message(&e)),
    }
}
