//! Shared batch runner
//!
//! Splits a selection into `ceil(n / workers)`-sized chunks, runs one pool
//! task per chunk and folds per-item outcomes into atomic counters and
//! deduplicated message sets.
//!
//! ```text
//!   items ──► chunk 0 ─► pool task ─┐  local message buffer
//!         ──► chunk 1 ─► pool task ─┼──(every 1000 / at end)──► MessageSets
//!         ──► chunk N ─► pool task ─┘
//!                           │
//!                           └── BatchCounters (completed, failed, bytes)
//! ```
//!
//! Every item ends as exactly one of completed or failed (skips count as
//! failed), so `completed + failed == total` once the batch returns.

use crate::cancel::CancelFlag;
use crate::error::{OpError, OperationOutcome, WorkerError};
use crate::pool::{chunk_ranges, WorkerPool};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Messages buffered per task before taking the shared lock
const MESSAGE_FLUSH_THRESHOLD: usize = 1000;

/// What a batch does to each item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Convert,
}

impl OperationKind {
    /// Past tense used in summaries
    pub fn past_tense(&self) -> &'static str {
        match self {
            OperationKind::Copy => "Copied",
            OperationKind::Move => "Moved",
            OperationKind::Delete => "Deleted",
            OperationKind::Convert => "Converted",
        }
    }

    pub fn needs_destination(&self) -> bool {
        matches!(self, OperationKind::Copy | OperationKind::Move)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Copy => "copy",
            OperationKind::Move => "move",
            OperationKind::Delete => "delete",
            OperationKind::Convert => "convert",
        };
        f.write_str(name)
    }
}

/// Live counters, shared with the progress display
#[derive(Debug, Default)]
pub struct BatchCounters {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
    total_bytes: AtomicU64,
}

impl BatchCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reset the counts and set the expected totals
    pub fn prepare(&self, total: usize, total_bytes: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Items finished either way
    pub fn processed(&self) -> usize {
        self.completed() + self.failed()
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }
}

/// Byte progress of one long-running item
///
/// Written by the single worker handling the item; every advance is also
/// credited to the batch byte counter the display reads.
#[derive(Debug)]
pub struct ProgressTask {
    counters: Arc<BatchCounters>,
    done: AtomicU64,
    total: u64,
}

impl ProgressTask {
    pub fn new(counters: Arc<BatchCounters>, total: u64) -> Self {
        Self {
            counters,
            done: AtomicU64::new(0),
            total,
        }
    }

    pub fn advance(&self, n: u64) {
        self.done.fetch_add(n, Ordering::Relaxed);
        self.counters.add_bytes(n);
    }

    pub fn bytes_done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.bytes_done() as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }
}

/// Everything a per-item handler may touch
pub struct ItemContext<'a> {
    pub cancel: &'a CancelFlag,
    pub counters: &'a Arc<BatchCounters>,
}

impl ItemContext<'_> {
    pub fn progress_task(&self, total: u64) -> ProgressTask {
        ProgressTask::new(Arc::clone(self.counters), total)
    }
}

/// Result of handling one item
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub outcome: OperationOutcome,
    pub warnings: Vec<String>,
    /// Paths that now exist and belong in the index
    pub created: Vec<String>,
    /// Paths that no longer exist and leave the index
    pub removed: Vec<String>,
}

impl ItemResult {
    pub fn success(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: OperationOutcome::Succeeded {
                path: path.into(),
                message: message.into(),
            },
            warnings: Vec::new(),
            created: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn error(path: impl Into<String>, reason: OpError) -> Self {
        Self {
            outcome: OperationOutcome::from_error(path, reason),
            warnings: Vec::new(),
            created: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn with_created(mut self, created: Vec<String>) -> Self {
        self.created = created;
        self
    }

    pub fn with_removed(mut self, removed: Vec<String>) -> Self {
        self.removed = removed;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Deduplicated, sorted message sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSets {
    pub successes: BTreeSet<String>,
    pub skips: BTreeSet<String>,
    pub failures: BTreeSet<String>,
    pub warnings: BTreeSet<String>,
}

impl MessageSets {
    fn absorb(&mut self, other: &mut MessageSets) {
        self.successes.append(&mut other.successes);
        self.skips.append(&mut other.skips);
        self.failures.append(&mut other.failures);
        self.warnings.append(&mut other.warnings);
    }

    fn len(&self) -> usize {
        self.successes.len() + self.skips.len() + self.failures.len() + self.warnings.len()
    }
}

/// Task-local buffer in front of the shared sets
struct MessageBuffer {
    local: MessageSets,
    shared: Arc<Mutex<MessageSets>>,
}

impl MessageBuffer {
    fn new(shared: Arc<Mutex<MessageSets>>) -> Self {
        Self {
            local: MessageSets::default(),
            shared,
        }
    }

    fn record(&mut self, result: &ItemResult) {
        match &result.outcome {
            OperationOutcome::Succeeded { message, .. } => {
                self.local.successes.insert(message.clone());
            }
            OperationOutcome::Skipped { reason, .. } => {
                self.local.skips.insert(reason.to_string());
            }
            OperationOutcome::Failed { reason, .. } => {
                self.local.failures.insert(reason.to_string());
            }
        }
        self.local.warnings.extend(result.warnings.iter().cloned());

        if self.local.len() >= MESSAGE_FLUSH_THRESHOLD {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.local.len() > 0 {
            self.shared.lock().absorb(&mut self.local);
        }
    }
}

impl Drop for MessageBuffer {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Aggregated result of a batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: OperationKind,
    pub total: usize,
    /// Items that succeeded
    pub completed: usize,
    /// Items that failed or were skipped
    pub failed: usize,
    /// Subset of `failed` that were skips
    pub skipped: usize,
    pub bytes: u64,
    pub messages: MessageSets,
    pub cancelled: bool,
    pub created: Vec<String>,
    pub removed: Vec<String>,
    pub duration: Duration,
}

impl BatchReport {
    /// Failures that were not skips
    pub fn errors(&self) -> usize {
        self.failed - self.skipped
    }
}

#[derive(Default)]
struct ChunkOutput {
    skipped: usize,
    created: Vec<String>,
    removed: Vec<String>,
}

/// Run `handler` over every item on the pool
pub fn run_batch<T, F>(
    pool: &WorkerPool,
    kind: OperationKind,
    items: Vec<T>,
    cancel: &CancelFlag,
    counters: &Arc<BatchCounters>,
    handler: F,
) -> Result<BatchReport, WorkerError>
where
    T: AsRef<str> + Send + Sync + 'static,
    F: Fn(&str, &ItemContext<'_>) -> ItemResult + Send + Sync + 'static,
{
    let start = Instant::now();
    let total = items.len();
    counters.prepare(total, counters.total_bytes());

    let items = Arc::new(items);
    let handler = Arc::new(handler);
    let messages = Arc::new(Mutex::new(MessageSets::default()));

    let ranges = chunk_ranges(total, pool.size());
    debug!(kind = %kind, items = total, chunks = ranges.len(), "Starting batch");

    let results = pool.run_bounded(ranges.into_iter().map(|range| {
        let items = Arc::clone(&items);
        let handler = Arc::clone(&handler);
        let messages = Arc::clone(&messages);
        let cancel = cancel.clone();
        let counters = Arc::clone(counters);

        move || {
            let mut buffer = MessageBuffer::new(messages);
            let mut output = ChunkOutput::default();
            let ctx = ItemContext {
                cancel: &cancel,
                counters: &counters,
            };

            for item in &items[range] {
                let path = item.as_ref();
                let result = if cancel.is_cancelled() {
                    ItemResult::error(path, OpError::Cancelled { path: path.to_string() })
                } else {
                    handler(path, &ctx)
                };

                match &result.outcome {
                    OperationOutcome::Succeeded { .. } => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    OperationOutcome::Skipped { .. } => {
                        output.skipped += 1;
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    OperationOutcome::Failed { .. } => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }

                buffer.record(&result);
                output.created.extend(result.created);
                output.removed.extend(result.removed);
            }

            output
        }
    }));

    let mut skipped = 0;
    let mut created = Vec::new();
    let mut removed = Vec::new();
    for result in results {
        let chunk = result?;
        skipped += chunk.skipped;
        created.extend(chunk.created);
        removed.extend(chunk.removed);
    }

    let messages = std::mem::take(&mut *messages.lock());
    let report = BatchReport {
        kind,
        total,
        completed: counters.completed(),
        failed: counters.failed(),
        skipped,
        bytes: counters.bytes(),
        messages,
        cancelled: cancel.is_cancelled(),
        created,
        removed,
        duration: start.elapsed(),
    };

    info!(
        kind = %kind,
        total,
        completed = report.completed,
        failed = report.failed,
        skipped,
        bytes = report.bytes,
        cancelled = report.cancelled,
        "Batch finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/isos/{}.iso", i)).collect()
    }

    #[test]
    fn test_counts_are_conserved() {
        let pool = WorkerPool::new(3).unwrap();
        let counters = BatchCounters::new();
        let cancel = CancelFlag::new();

        let report = run_batch(&pool, OperationKind::Delete, items(100), &cancel, &counters, |path, _| {
            let n: usize = path
                .trim_start_matches("/isos/")
                .trim_end_matches(".iso")
                .parse()
                .unwrap();
            match n % 3 {
                0 => ItemResult::success(path, format!("ok {}", path)),
                1 => ItemResult::error(path, OpError::FileExists { path: path.to_string() }),
                _ => ItemResult::error(path, OpError::SourceMissing { path: path.to_string() }),
            }
        })
        .unwrap();

        assert_eq!(report.total, 100);
        assert_eq!(report.completed, 34);
        assert_eq!(report.skipped, 33);
        assert_eq!(report.failed, 66);
        assert_eq!(report.errors(), 33);
        assert_eq!(report.completed + report.failed, report.total);
        assert_eq!(report.messages.successes.len(), 34);
        assert_eq!(report.messages.skips.len(), 33);
        assert_eq!(report.messages.failures.len(), 33);
    }

    #[test]
    fn test_cancelled_before_start() {
        let pool = WorkerPool::new(2).unwrap();
        let counters = BatchCounters::new();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = run_batch(&pool, OperationKind::Copy, items(10), &cancel, &counters, |path, _| {
            ItemResult::success(path, "unreachable")
        })
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 10);
        assert_eq!(report.messages.failures.len(), 10);
    }

    #[test]
    fn test_created_and_removed_collected() {
        let pool = WorkerPool::new(2).unwrap();
        let counters = BatchCounters::new();
        let cancel = CancelFlag::new();

        let report = run_batch(&pool, OperationKind::Move, items(5), &cancel, &counters, |path, ctx| {
            ctx.progress_task(10).advance(10);
            ItemResult::success(path, path.to_string())
                .with_created(vec![format!("/dest{}", path)])
                .with_removed(vec![path.to_string()])
                .with_warnings(vec!["careful".to_string()])
        })
        .unwrap();

        assert_eq!(report.created.len(), 5);
        assert_eq!(report.removed.len(), 5);
        assert_eq!(report.bytes, 50);
        assert_eq!(report.messages.warnings.len(), 1);
    }

    #[test]
    fn test_empty_batch() {
        let pool = WorkerPool::new(2).unwrap();
        let counters = BatchCounters::new();
        let report = run_batch(&pool, OperationKind::Delete, Vec::<String>::new(), &CancelFlag::new(), &counters, |p, _| {
            ItemResult::success(p, "")
        })
        .unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.completed + report.failed, 0);
    }

    #[test]
    fn test_progress_task_percent() {
        let counters = BatchCounters::new();
        let task = ProgressTask::new(Arc::clone(&counters), 200);
        task.advance(50);
        assert_eq!(task.bytes_done(), 50);
        assert!((task.percent() - 25.0).abs() < f64::EPSILON);
        assert_eq!(counters.bytes(), 50);
        assert_eq!(ProgressTask::new(counters, 0).percent(), 100.0);
    }
}
