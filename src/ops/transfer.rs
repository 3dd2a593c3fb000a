//! Copy, move and delete
//!
//! Each source is handled independently on a pool worker; a failure on
//! one item never affects its siblings.
//!
//! - Copy: buffered copy into every destination directory.
//! - Move: one destination tries an atomic `rename` first and falls back
//!   to copy + remove across filesystems (`EXDEV`). Several destinations
//!   copy into each and remove the source once at least one copy landed.
//! - Delete: remove the file, crediting its size to the byte counter.
//!
//! Files created while running under `sudo` are handed back to the
//! invoking user.

use super::batch::{run_batch, BatchCounters, BatchReport, ItemContext, ItemResult, OperationKind, ProgressTask};
use crate::cancel::CancelFlag;
use crate::error::{ConfigError, OpError, OpResult, WorkerError};
use crate::pool::WorkerPool;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Copy buffer size (8 MiB)
pub const COPY_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// A copy/move/delete request against a selection
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub kind: OperationKind,
    pub sources: Vec<String>,
    pub destinations: Vec<PathBuf>,
    pub overwrite: bool,
}

/// Split a `;`-separated destination list
///
/// Blank entries are dropped and repeated directories collapsed. An empty
/// result is an error.
pub fn parse_destinations(list: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let mut destinations: Vec<PathBuf> = Vec::new();
    for part in list.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(part);
        if !destinations.contains(&path) {
            destinations.push(path);
        }
    }

    if destinations.is_empty() {
        return Err(ConfigError::InvalidDestinations {
            list: list.to_string(),
            reason: "no destination directory given".to_string(),
        });
    }
    Ok(destinations)
}

/// Run a transfer over the pool
pub fn execute_transfer(
    pool: &WorkerPool,
    request: TransferRequest,
    cancel: &CancelFlag,
    counters: &Arc<BatchCounters>,
) -> Result<BatchReport, WorkerError> {
    let TransferRequest {
        kind,
        sources,
        destinations,
        overwrite,
    } = request;
    let destinations = Arc::new(destinations);

    run_batch(pool, kind, sources, cancel, counters, move |source, ctx| match kind {
        OperationKind::Delete => delete_one(source, ctx),
        OperationKind::Copy | OperationKind::Move => {
            transfer_one(source, &destinations, kind == OperationKind::Move, overwrite, ctx)
        }
        OperationKind::Convert => ItemResult::error(source, OpError::UnsupportedFormat { path: source.to_string() }),
    })
}

/// Sum of source sizes, for progress totals
pub fn total_size(sources: &[String]) -> u64 {
    sources
        .iter()
        .filter_map(|s| fs::metadata(s).ok())
        .map(|m| m.len())
        .sum()
}

fn delete_one(source: &str, ctx: &ItemContext<'_>) -> ItemResult {
    let meta = match fs::symlink_metadata(source) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return ItemResult::error(source, OpError::SourceMissing { path: source.to_string() })
        }
        Err(e) => return ItemResult::error(source, OpError::from_io(source, &e)),
    };

    match fs::remove_file(source) {
        Ok(()) => {
            ctx.counters.add_bytes(meta.len());
            ItemResult::success(source, format!("Deleted '{}'", source)).with_removed(vec![source.to_string()])
        }
        Err(e) => ItemResult::error(source, OpError::from_io(source, &e)),
    }
}

fn transfer_one(
    source: &str,
    destinations: &[PathBuf],
    is_move: bool,
    overwrite: bool,
    ctx: &ItemContext<'_>,
) -> ItemResult {
    let src = Path::new(source);
    let meta = match fs::metadata(src) {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return ItemResult::error(source, OpError::SourceMissing { path: source.to_string() }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return ItemResult::error(source, OpError::SourceMissing { path: source.to_string() })
        }
        Err(e) => return ItemResult::error(source, OpError::from_io(source, &e)),
    };
    let Some(file_name) = src.file_name() else {
        return ItemResult::error(source, OpError::SourceMissing { path: source.to_string() });
    };

    let mut created = Vec::new();
    let mut errors: Vec<OpError> = Vec::new();
    let mut warnings = Vec::new();
    let mut source_gone = false;

    let single_move = is_move && destinations.len() == 1;

    for dest in destinations {
        let target = dest.join(file_name);
        let result = check_target(src, &meta, dest, &target, overwrite).and_then(|()| {
            if single_move {
                move_file(src, &meta, &target, ctx).map(|renamed| source_gone = renamed)
            } else {
                copy_file(src, &meta, &target, ctx)
            }
        });

        match result {
            Ok(_) => {
                if let Some(warning) = hand_to_sudo_user(&target) {
                    warnings.push(warning);
                }
                created.push(target.to_string_lossy().into_owned());
            }
            Err(OpError::Cancelled { path }) => {
                errors.push(OpError::Cancelled { path });
                break;
            }
            Err(e) => errors.push(e),
        }
    }

    if created.is_empty() {
        let mut errors = errors.into_iter();
        let first = errors
            .next()
            .unwrap_or_else(|| OpError::SourceMissing { path: source.to_string() });
        warnings.extend(errors.map(|e| e.to_string()));
        return ItemResult::error(source, first).with_warnings(warnings);
    }

    // Partial success: remaining destination failures become warnings
    warnings.extend(errors.iter().map(|e| e.to_string()));

    let mut removed = Vec::new();
    if is_move {
        if !source_gone {
            match fs::remove_file(src) {
                Ok(()) => source_gone = true,
                Err(e) => warnings.push(format!("Moved '{}' but could not remove the source: {}", source, e)),
            }
        }
        if source_gone {
            removed.push(source.to_string());
        }
    }

    let verb = if is_move { "Moved" } else { "Copied" };
    let message = format!("{} '{}' to '{}'", verb, source, created.join("', '"));
    ItemResult::success(source, message)
        .with_created(created)
        .with_removed(removed)
        .with_warnings(warnings)
}

/// Per-target checks shared by copy and move
fn check_target(src: &Path, meta: &fs::Metadata, dest: &Path, target: &Path, overwrite: bool) -> OpResult<()> {
    if !dest.is_dir() {
        return Err(OpError::InvalidDestination {
            path: dest.to_string_lossy().into_owned(),
        });
    }

    match fs::metadata(target) {
        Ok(existing) => {
            if existing.dev() == meta.dev() && existing.ino() == meta.ino() {
                return Err(OpError::SameFile {
                    path: src.to_string_lossy().into_owned(),
                });
            }
            if !overwrite {
                return Err(OpError::FileExists {
                    path: target.to_string_lossy().into_owned(),
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OpError::from_io(target.to_string_lossy(), &e)),
    }
}

/// Rename, falling back to a copy across devices
///
/// Returns true when the rename succeeded; after a fallback copy the
/// source is still in place and the caller removes it.
fn move_file(src: &Path, meta: &fs::Metadata, target: &Path, ctx: &ItemContext<'_>) -> OpResult<bool> {
    match fs::rename(src, target) {
        Ok(()) => {
            ctx.counters.add_bytes(meta.len());
            Ok(true)
        }
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            debug!(source = %src.display(), "Cross-device move, copying");
            copy_file(src, meta, target, ctx)?;
            Ok(false)
        }
        Err(e) => Err(OpError::from_io(src.to_string_lossy(), &e)),
    }
}

/// Buffered copy of `src` into `target`
fn copy_file(src: &Path, meta: &fs::Metadata, target: &Path, ctx: &ItemContext<'_>) -> OpResult<()> {
    let reader = File::open(src).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => OpError::SourceMissing {
            path: src.to_string_lossy().into_owned(),
        },
        _ => OpError::from_io(src.to_string_lossy(), &e),
    })?;
    write_target(reader, src, meta, target, ctx)
}

/// Stream `reader` into a freshly created `target`
///
/// Once the target has been created, a cancelled or failed copy removes
/// it. Errors before that leave any existing file alone.
fn write_target<R: Read>(
    mut reader: R,
    src: &Path,
    meta: &fs::Metadata,
    target: &Path,
    ctx: &ItemContext<'_>,
) -> OpResult<()> {
    let mut writer = File::create(target).map_err(|e| OpError::from_io(target.to_string_lossy(), &e))?;
    let task = ctx.progress_task(meta.len());
    let result = copy_chunks(&mut reader, &mut writer, src, target, ctx.cancel, &task);
    drop(writer);

    match &result {
        Err(_) => {
            if let Err(e) = fs::remove_file(target) {
                debug!(target = %target.display(), error = %e, "Could not remove partial copy");
            }
        }
        Ok(()) => {
            if let Err(e) = fs::set_permissions(target, meta.permissions()) {
                debug!(target = %target.display(), error = %e, "Could not copy permissions");
            }
        }
    }
    result
}

/// Copy loop with cancellation between chunks
fn copy_chunks<R: Read>(
    reader: &mut R,
    writer: &mut File,
    src: &Path,
    target: &Path,
    cancel: &CancelFlag,
    task: &ProgressTask,
) -> OpResult<()> {
    let src_str = || src.to_string_lossy().into_owned();
    let target_str = || target.to_string_lossy().into_owned();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(OpError::Cancelled { path: src_str() });
        }

        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(OpError::from_io(src_str(), &e)),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|e| OpError::from_io(target_str(), &e))?;
        task.advance(n as u64);
    }

    writer.flush().map_err(|e| OpError::from_io(target_str(), &e))
}

/// Under `sudo`, give a created file to the invoking user
///
/// Returns a warning message when the ownership change fails.
fn hand_to_sudo_user(path: &Path) -> Option<String> {
    // SAFETY: geteuid has no preconditions
    if unsafe { libc::geteuid() } != 0 {
        return None;
    }
    let uid = std::env::var("SUDO_UID").ok()?.parse::<u32>().ok()?;
    let gid = std::env::var("SUDO_GID").ok()?.parse::<u32>().ok()?;

    std::os::unix::fs::chown(path, Some(uid), Some(gid))
        .err()
        .map(|e| format!("Could not change owner of '{}': {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(dir: &Path, name: &str, content: &[u8]) -> String {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Reader that raises the cancel flag after its first chunk
    struct CancelAfterFirstRead {
        inner: File,
        cancel: CancelFlag,
    }

    impl Read for CancelAfterFirstRead {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.cancel.cancel();
            Ok(n)
        }
    }

    fn sized_file(dir: &Path, name: &str, len: u64) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().set_len(len).unwrap();
        path
    }

    fn run(request: TransferRequest) -> BatchReport {
        let pool = WorkerPool::new(2).unwrap();
        execute_transfer(&pool, request, &CancelFlag::new(), &BatchCounters::new()).unwrap()
    }

    #[test]
    fn test_parse_destinations() {
        assert_eq!(
            parse_destinations(" /a ; /b;;/a ").unwrap(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert!(parse_destinations(" ; ").is_err());
    }

    #[test]
    fn test_copy_to_multiple_destinations() {
        let src = TempDir::new().unwrap();
        let d1 = TempDir::new().unwrap();
        let d2 = TempDir::new().unwrap();
        let a = file(src.path(), "a.iso", b"alpha");

        let report = run(TransferRequest {
            kind: OperationKind::Copy,
            sources: vec![a.clone()],
            destinations: vec![d1.path().to_path_buf(), d2.path().to_path_buf()],
            overwrite: false,
        });

        assert_eq!(report.completed, 1);
        assert_eq!(report.created.len(), 2);
        assert!(report.removed.is_empty());
        assert_eq!(fs::read(d1.path().join("a.iso")).unwrap(), b"alpha");
        assert_eq!(fs::read(d2.path().join("a.iso")).unwrap(), b"alpha");
        assert!(Path::new(&a).exists());
        assert_eq!(report.bytes, 10);
    }

    #[test]
    fn test_existing_target_skipped_unless_overwrite() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = file(src.path(), "a.iso", b"new");
        file(dest.path(), "a.iso", b"old");

        let request = TransferRequest {
            kind: OperationKind::Copy,
            sources: vec![a],
            destinations: vec![dest.path().to_path_buf()],
            overwrite: false,
        };
        let report = run(request.clone());
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(fs::read(dest.path().join("a.iso")).unwrap(), b"old");

        let report = run(TransferRequest {
            overwrite: true,
            ..request
        });
        assert_eq!(report.completed, 1);
        assert_eq!(fs::read(dest.path().join("a.iso")).unwrap(), b"new");
    }

    #[test]
    fn test_same_file_skipped() {
        let dir = TempDir::new().unwrap();
        let a = file(dir.path(), "a.iso", b"data");

        let report = run(TransferRequest {
            kind: OperationKind::Copy,
            sources: vec![a.clone()],
            destinations: vec![dir.path().to_path_buf()],
            overwrite: true,
        });
        assert_eq!(report.skipped, 1);
        assert_eq!(fs::read(&a).unwrap(), b"data");
    }

    #[test]
    fn test_invalid_destination_and_missing_source() {
        let dir = TempDir::new().unwrap();
        let a = file(dir.path(), "a.iso", b"data");
        let missing = dir.path().join("gone.iso").to_string_lossy().into_owned();

        let report = run(TransferRequest {
            kind: OperationKind::Move,
            sources: vec![a.clone(), missing],
            destinations: vec![dir.path().join("no-such-dir")],
            overwrite: false,
        });
        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 2);
        assert_eq!(report.skipped, 0);
        assert!(Path::new(&a).exists());
    }

    #[test]
    fn test_move_single_destination() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = file(src.path(), "a.iso", b"data");

        let report = run(TransferRequest {
            kind: OperationKind::Move,
            sources: vec![a.clone()],
            destinations: vec![dest.path().to_path_buf()],
            overwrite: false,
        });
        assert_eq!(report.completed, 1);
        assert_eq!(report.removed, vec![a.clone()]);
        assert!(!Path::new(&a).exists());
        assert!(dest.path().join("a.iso").exists());
    }

    #[test]
    fn test_move_multi_destination_removes_source_if_any_succeeded() {
        let src = TempDir::new().unwrap();
        let good = TempDir::new().unwrap();
        let a = file(src.path(), "a.iso", b"data");

        let report = run(TransferRequest {
            kind: OperationKind::Move,
            sources: vec![a.clone()],
            destinations: vec![src.path().join("missing-dir"), good.path().to_path_buf()],
            overwrite: false,
        });

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 0);
        assert!(!Path::new(&a).exists());
        assert!(good.path().join("a.iso").exists());
        assert_eq!(report.messages.warnings.len(), 1);
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let a = file(dir.path(), "a.iso", b"12345");
        let missing = dir.path().join("gone.iso").to_string_lossy().into_owned();

        let report = run(TransferRequest {
            kind: OperationKind::Delete,
            sources: vec![a.clone(), missing],
            destinations: Vec::new(),
            overwrite: false,
        });
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.bytes, 5);
        assert_eq!(report.removed, vec![a.clone()]);
        assert!(!Path::new(&a).exists());
    }

    #[test]
    fn test_cancelled_copy_leaves_no_partial() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = file(src.path(), "a.iso", b"data");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let pool = WorkerPool::new(1).unwrap();
        let report = execute_transfer(
            &pool,
            TransferRequest {
                kind: OperationKind::Copy,
                sources: vec![a],
                destinations: vec![dest.path().to_path_buf()],
                overwrite: false,
            },
            &cancel,
            &BatchCounters::new(),
        )
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.failed, 1);
        assert!(!dest.path().join("a.iso").exists());
    }

    #[test]
    fn test_vanished_source_keeps_existing_target() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = file(src.path(), "a.iso", b"new");
        let target = PathBuf::from(file(dest.path(), "a.iso", b"precious"));

        let meta = fs::metadata(&a).unwrap();
        check_target(Path::new(&a), &meta, dest.path(), &target, true).unwrap();
        fs::remove_file(&a).unwrap();

        let cancel = CancelFlag::new();
        let counters = BatchCounters::new();
        let ctx = ItemContext {
            cancel: &cancel,
            counters: &counters,
        };
        let result = copy_file(Path::new(&a), &meta, &target, &ctx);

        assert_eq!(result, Err(OpError::SourceMissing { path: a.clone() }));
        assert_eq!(fs::read(&target).unwrap(), b"precious");
    }

    #[test]
    fn test_cancel_during_copy_removes_partial_target() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = sized_file(src.path(), "big.iso", 3 * COPY_BUFFER_SIZE as u64);
        let target = dest.path().join("big.iso");

        let cancel = CancelFlag::new();
        let counters = BatchCounters::new();
        let ctx = ItemContext {
            cancel: &cancel,
            counters: &counters,
        };
        let reader = CancelAfterFirstRead {
            inner: File::open(&a).unwrap(),
            cancel: cancel.clone(),
        };
        let meta = fs::metadata(&a).unwrap();
        let result = write_target(reader, &a, &meta, &target, &ctx);

        assert!(matches!(result, Err(OpError::Cancelled { .. })));
        assert!(!target.exists());
        assert_eq!(counters.bytes(), COPY_BUFFER_SIZE as u64);
    }

    #[test]
    fn test_cancel_mid_batch_conserves_counts() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let sources: Vec<String> = (0..4)
            .map(|i| {
                sized_file(src.path(), &format!("{}.iso", i), 2 * COPY_BUFFER_SIZE as u64)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        let dest_dir = dest.path().to_path_buf();

        // One worker keeps the items in order: 0 copies, 1 is cut off
        // mid-copy, 2 and 3 never start.
        let pool = WorkerPool::new(1).unwrap();
        let cancel = CancelFlag::new();
        let counters = BatchCounters::new();
        let report = run_batch(&pool, OperationKind::Copy, sources, &cancel, &counters, move |source, ctx| {
            let src = Path::new(source);
            let meta = fs::metadata(src).unwrap();
            let target = dest_dir.join(src.file_name().unwrap());
            let result = if source.ends_with("/1.iso") {
                let reader = CancelAfterFirstRead {
                    inner: File::open(src).unwrap(),
                    cancel: ctx.cancel.clone(),
                };
                write_target(reader, src, &meta, &target, ctx)
            } else {
                copy_file(src, &meta, &target, ctx)
            };
            match result {
                Ok(()) => ItemResult::success(source, "copied"),
                Err(e) => ItemResult::error(source, e),
            }
        })
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(report.completed + report.failed, report.total);
        assert_eq!(report.messages.failures.len(), 3);
        assert!(dest.path().join("0.iso").exists());
        for i in 1..4 {
            assert!(!dest.path().join(format!("{}.iso", i)).exists());
        }
    }
}
