//! Engine context
//!
//! Owns the worker pool, the cancellation flag, the index and its mirror,
//! and the live batch counters. Every front-end operation is a method here
//! so nothing in the crate relies on global state.

use crate::cancel::CancelFlag;
use crate::config::EngineConfig;
use crate::error::{IndexResult, Result};
use crate::index::{IndexMirror, LineHistory, PathIndex, PruneReport, SaveReport};
use crate::ops::{
    convert_batch, execute_transfer, total_size, BatchCounters, BatchReport, Converter, ImageFormat,
    TransferRequest,
};
use crate::pool::WorkerPool;
use crate::search::FilterStack;
use crate::selection::parse_selection;
use crate::sort::parallel_sort;
use crate::walker::{TraversalResult, Traverser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts for an index update that hit lock contention
const INDEX_RETRIES: usize = 3;
const INDEX_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Result of an import
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub roots: Vec<PathBuf>,
    pub traversal: TraversalResult,
    pub saved: SaveReport,
}

/// A filtered view of the index
#[derive(Debug, Clone)]
pub struct FilteredView {
    pub stack: FilterStack,
    /// Filters that matched nothing and were not applied
    pub unmatched: Vec<String>,
}

/// Images found for conversion, and what became of them
#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub scan: TraversalResult,
    /// Selection tokens that were rejected
    pub selection_errors: Vec<String>,
    pub batch: Option<BatchReport>,
}

pub struct Engine {
    config: EngineConfig,
    pool: WorkerPool,
    cancel: CancelFlag,
    index: PathIndex,
    mirror: IndexMirror,
    counters: Arc<BatchCounters>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let pool = WorkerPool::new(config.worker_count)?;
        let index = PathIndex::new(config.index_path.clone(), config.max_entries);
        if let Err(e) = index.ensure_exists() {
            warn!(error = %e, "Index unavailable; re-import to rebuild it");
        }

        info!(
            workers = pool.size(),
            index = %index.path().display(),
            max_entries = index.max_entries(),
            "Engine ready"
        );

        Ok(Self {
            config,
            pool,
            cancel: CancelFlag::new(),
            index,
            mirror: IndexMirror::new(),
            counters: BatchCounters::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Flag to hand to the signal handler
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Live counters of the running batch
    pub fn counters(&self) -> Arc<BatchCounters> {
        Arc::clone(&self.counters)
    }

    fn folder_history(&self) -> LineHistory {
        LineHistory::new(self.config.folder_history_path(), self.config.folder_history_capacity())
    }

    fn filter_history(&self) -> LineHistory {
        LineHistory::new(self.config.filter_history_path(), self.config.filter_history_capacity())
    }

    /// Scan `roots` for ISO images and add them to the index
    pub fn import(&self, roots: &[PathBuf]) -> Result<ImportReport> {
        self.cancel.reset();
        let traverser = Traverser::new(self.config.traverse_options(ImageFormat::Iso), self.cancel.clone());
        let traversal = traverser.traverse_roots(&self.pool, roots)?;

        let saved = with_retry(|| self.index.save(&traversal.paths))?;

        let history = self.folder_history();
        for root in roots.iter().filter(|r| r.is_dir()) {
            let root = root.canonicalize().unwrap_or_else(|_| root.clone());
            if let Err(e) = history.record(&root.to_string_lossy()) {
                warn!(error = %e, "Could not update folder history");
            }
        }

        info!(
            roots = roots.len(),
            found = traversal.paths.len(),
            added = saved.added,
            evicted = saved.evicted,
            "Import finished"
        );

        Ok(ImportReport {
            roots: roots.to_vec(),
            traversal,
            saved,
        })
    }

    /// Re-scan the directories recorded in the folder history
    pub fn auto_import(&self) -> Result<ImportReport> {
        let roots: Vec<PathBuf> = self
            .folder_history()
            .load()?
            .into_iter()
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
            .collect();
        debug!(roots = roots.len(), "Auto-import roots loaded");
        self.import(&roots)
    }

    /// Sorted index entries, reloaded only when the file changed
    pub fn try_snapshot(&self) -> IndexResult<Arc<Vec<String>>> {
        self.mirror.snapshot(&self.index, &self.pool)
    }

    /// Like [`Engine::try_snapshot`], degrading to an empty list
    pub fn snapshot(&self) -> Arc<Vec<String>> {
        match self.try_snapshot() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Index unavailable; re-import to rebuild it");
                Arc::new(Vec::new())
            }
        }
    }

    /// Index snapshot with `filters` stacked in order
    pub fn filtered(&self, filters: &[String]) -> Result<FilteredView> {
        let mut stack = FilterStack::new(self.snapshot());
        let mut unmatched = Vec::new();
        let history = self.filter_history();

        for filter in filters {
            if stack.apply(&self.pool, filter)? == 0 {
                unmatched.push(filter.clone());
                continue;
            }
            if let Err(e) = history.record(filter) {
                warn!(error = %e, "Could not update filter history");
            }
        }

        Ok(FilteredView { stack, unmatched })
    }

    /// Recently used filters, newest first
    pub fn recent_filters(&self) -> IndexResult<Vec<String>> {
        self.filter_history().load()
    }

    /// Drop index entries whose files are gone
    pub fn prune(&self) -> Result<PruneReport> {
        Ok(with_retry(|| self.index.prune(&self.pool))?)
    }

    /// Empty the index
    pub fn clear(&self) -> Result<()> {
        with_retry(|| self.index.clear())?;
        self.mirror.invalidate();
        Ok(())
    }

    /// Run a copy, move or delete and update the index
    pub fn run_transfer(&self, request: TransferRequest) -> Result<BatchReport> {
        self.cancel.reset();
        self.counters
            .prepare(request.sources.len(), total_size(&request.sources));

        let dirs = if request.kind.needs_destination() {
            request.destinations.clone()
        } else {
            Vec::new()
        };
        let mut report = execute_transfer(&self.pool, request, &self.cancel, &self.counters)?;
        self.update_index(&mut report, &dirs);
        Ok(report)
    }

    /// Find images of `format` under `roots`, naturally sorted
    pub fn scan_convertible(&self, format: ImageFormat, roots: &[PathBuf]) -> Result<TraversalResult> {
        self.cancel.reset();
        let traverser = Traverser::new(self.config.traverse_options(format), self.cancel.clone());
        let mut result = traverser.traverse_roots(&self.pool, roots)?;
        result.paths = parallel_sort(&self.pool, std::mem::take(&mut result.paths))?;
        Ok(result)
    }

    /// Scan, select and convert images to ISO
    ///
    /// `selection` picks 1-based positions in the scan result; `None`
    /// converts everything found.
    pub fn convert(
        &self,
        format: ImageFormat,
        roots: &[PathBuf],
        selection: Option<&str>,
        converter: Arc<dyn Converter>,
        overwrite: bool,
    ) -> Result<ConvertReport> {
        let scan = self.scan_convertible(format, roots)?;
        if scan.interrupted || scan.paths.is_empty() {
            return Ok(ConvertReport {
                scan,
                selection_errors: Vec::new(),
                batch: None,
            });
        }

        let (inputs, selection_errors) = match selection {
            Some(text) => {
                let stack = FilterStack::new(Arc::new(scan.paths.clone()));
                let selection = parse_selection(text, stack.len());
                (selection.resolve(&stack), selection.errors.into_iter().collect())
            }
            None => (scan.paths.clone(), Vec::new()),
        };

        if inputs.is_empty() {
            return Ok(ConvertReport {
                scan,
                selection_errors,
                batch: None,
            });
        }

        let batch = self.convert_paths(inputs, converter, overwrite)?;
        Ok(ConvertReport {
            scan,
            selection_errors,
            batch: Some(batch),
        })
    }

    /// Convert explicit inputs and index the produced images
    pub fn convert_paths(&self, inputs: Vec<String>, converter: Arc<dyn Converter>, overwrite: bool) -> Result<BatchReport> {
        self.cancel.reset();
        self.counters.prepare(inputs.len(), 0);

        let mut report = convert_batch(&self.pool, inputs, converter, overwrite, &self.cancel, &self.counters)?;
        let mut dirs: Vec<PathBuf> = Vec::new();
        for parent in report.created.iter().filter_map(|p| Path::new(p).parent()) {
            if !dirs.iter().any(|d| d == parent) {
                dirs.push(parent.to_path_buf());
            }
        }
        self.update_index(&mut report, &dirs);
        Ok(report)
    }

    /// Index the images in `dirs` and drop removed files
    ///
    /// `dirs` are re-scanned with the import rules (extension, minimum size,
    /// depth, exclusions), so only qualifying images land in the index. A
    /// cancelled batch skips the scan and indexes the qualifying files it
    /// created. Index failures are reported as batch warnings; the files
    /// on disk are already in their final state.
    fn update_index(&self, report: &mut BatchReport, dirs: &[PathBuf]) {
        if report.completed > 0 && !dirs.is_empty() {
            let options = self.config.traverse_options(ImageFormat::Iso);
            let found: Vec<String> = if report.cancelled {
                report
                    .created
                    .iter()
                    .filter(|p| options.qualifies(Path::new(p)))
                    .cloned()
                    .collect()
            } else {
                let traverser = Traverser::new(options, self.cancel.clone());
                match traverser.traverse_roots(&self.pool, dirs) {
                    Ok(result) => result.paths,
                    Err(e) => {
                        warn!(error = %e, "Could not scan destinations");
                        report.messages.warnings.insert(format!("Destinations not scanned: {}", e));
                        Vec::new()
                    }
                }
            };

            if !found.is_empty() {
                match with_retry(|| self.index.save(&found)) {
                    Ok(saved) => debug!(added = saved.added, "Destination images indexed"),
                    Err(e) => {
                        warn!(error = %e, "Could not add new files to the index");
                        report.messages.warnings.insert(format!("Index not updated: {}", e));
                    }
                }
            }
        }

        if !report.removed.is_empty() {
            match with_retry(|| self.index.remove(&report.removed)) {
                Ok(n) => debug!(removed = n, "Index entries dropped"),
                Err(e) => {
                    warn!(error = %e, "Could not drop removed files from the index");
                    report.messages.warnings.insert(format!("Index not updated: {}", e));
                }
            }
        }
    }
}

/// Retry an index operation while the lock is contended
fn with_retry<T>(mut op: impl FnMut() -> IndexResult<T>) -> IndexResult<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_transient() && attempt < INDEX_RETRIES => {
                debug!(attempt, error = %e, "Index busy, retrying");
                attempt += 1;
                thread::sleep(INDEX_RETRY_DELAY);
            }
            other => return other,
        }
    }
}
