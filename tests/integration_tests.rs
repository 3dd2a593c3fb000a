//! Integration tests for iso-commander
//!
//! These run against real files in temporary directories; no external
//! converter programs are needed.

use iso_commander::cancel::CancelFlag;
use iso_commander::error::OpError;
use iso_commander::index::PathIndex;
use iso_commander::ops::batch::{run_batch, ItemResult};
use iso_commander::ops::{execute_transfer, BatchCounters, OperationKind, TransferRequest};
use iso_commander::pool::WorkerPool;
use iso_commander::search::FilterStack;
use iso_commander::selection::parse_selection;
use iso_commander::sort::{natural_sort, parallel_sort};
use iso_commander::walker::{TraverseOptions, Traverser};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const FIVE_MIB: u64 = 5 * 1024 * 1024;

fn sparse_file(path: &Path, len: u64) {
    File::create(path).unwrap().set_len(len).unwrap();
}

#[test]
fn test_end_to_end_import_delete_prune() {
    let dir = tempdir().unwrap();
    let games = dir.path().join("games");
    fs::create_dir_all(games.join("nested")).unwrap();

    sparse_file(&games.join("alpha.iso"), FIVE_MIB);
    sparse_file(&games.join("Beta.ISO"), FIVE_MIB);
    sparse_file(&games.join("nested/gamma.iso"), FIVE_MIB);
    sparse_file(&games.join("tiny.iso"), 1024);

    let pool = WorkerPool::new(2).unwrap();
    let traverser = Traverser::new(TraverseOptions::iso(), CancelFlag::new());
    let result = traverser.traverse_roots(&pool, &[games.clone()]).unwrap();

    assert!(!result.interrupted);
    assert_eq!(result.paths.len(), 3);
    assert!(result.paths.iter().all(|p| !p.ends_with("tiny.iso")));

    let index = PathIndex::new(dir.path().join("cache/iso_cache.txt"), 100);
    let saved = index.save(&result.paths).unwrap();
    assert_eq!(saved.added, 3);

    let mut loaded = index.load().unwrap();
    let mut expected = result.paths.clone();
    loaded.sort();
    expected.sort();
    assert_eq!(loaded, expected);

    let victim = loaded.iter().find(|p| p.ends_with("alpha.iso")).unwrap().clone();
    let request = TransferRequest {
        kind: OperationKind::Delete,
        sources: vec![victim.clone()],
        destinations: Vec::new(),
        overwrite: false,
    };
    let deleted = execute_transfer(&pool, request, &CancelFlag::new(), &BatchCounters::new()).unwrap();
    assert_eq!(deleted.completed, 1);
    assert_eq!(deleted.failed, 0);
    assert!(!Path::new(&victim).exists());

    let report = index.prune(&pool).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.remaining, 2);
    assert!(!index.load().unwrap().contains(&victim));
}

#[test]
fn test_save_is_idempotent() {
    let dir = tempdir().unwrap();
    let index = PathIndex::new(dir.path().join("iso_cache.txt"), 100);
    let entries = vec!["/a/one.iso".to_string(), "/a/two.iso".to_string()];

    index.save(&entries).unwrap();
    let before = fs::read(index.path()).unwrap();
    let modified = fs::metadata(index.path()).unwrap().modified().unwrap();

    let report = index.save(&entries).unwrap();
    assert!(!report.found_new());
    assert_eq!(fs::read(index.path()).unwrap(), before);
    assert_eq!(fs::metadata(index.path()).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_save_never_duplicates() {
    let dir = tempdir().unwrap();
    let index = PathIndex::new(dir.path().join("iso_cache.txt"), 100);

    index.save(&["/x.iso", "/y.iso", "/x.iso"]).unwrap();
    index.save(&["/y.iso", "/z.iso"]).unwrap();

    let mut loaded = index.load().unwrap();
    loaded.sort();
    assert_eq!(loaded, vec!["/x.iso", "/y.iso", "/z.iso"]);
}

#[test]
fn test_eviction_keeps_newest() {
    let dir = tempdir().unwrap();
    let index = PathIndex::new(dir.path().join("iso_cache.txt"), 3);

    index.save(&["/1.iso", "/2.iso", "/3.iso"]).unwrap();
    let report = index.save(&["/4.iso", "/5.iso"]).unwrap();

    assert_eq!(report.evicted, 2);
    let loaded = index.load().unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(!loaded.contains(&"/1.iso".to_string()));
    assert!(!loaded.contains(&"/2.iso".to_string()));
    assert!(loaded.contains(&"/5.iso".to_string()));
}

#[test]
fn test_prune_without_missing_files_leaves_index_untouched() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("kept.iso");
    fs::write(&image, b"data").unwrap();

    let index = PathIndex::new(dir.path().join("iso_cache.txt"), 100);
    index.save(&[image.to_string_lossy().to_string()]).unwrap();
    let before = fs::read(index.path()).unwrap();

    let pool = WorkerPool::new(2).unwrap();
    let report = index.prune(&pool).unwrap();

    assert_eq!(report.removed, 0);
    assert!(!report.rewritten);
    assert_eq!(fs::read(index.path()).unwrap(), before);
}

#[test]
fn test_filter_stack_and_selection() {
    let base = Arc::new(vec![
        "/games/Final Fantasy X.iso".to_string(),
        "/games/gran turismo 4.iso".to_string(),
        "/games/Fantasy Zone.iso".to_string(),
        "/backup/final fantasy xii.iso".to_string(),
    ]);
    let pool = WorkerPool::new(2).unwrap();
    let mut stack = FilterStack::new(Arc::clone(&base));

    assert_eq!(stack.apply(&pool, "fantasy").unwrap(), 3);
    assert_eq!(stack.apply(&pool, "/backup;zone").unwrap(), 2);
    assert_eq!(stack.depth(), 2);

    let selection = parse_selection("2 1 9", stack.len());
    assert_eq!(selection.indices, vec![2, 1]);
    assert_eq!(selection.errors.len(), 1);
    assert_eq!(
        selection.resolve(&stack),
        vec![
            "/backup/final fantasy xii.iso".to_string(),
            "/games/Fantasy Zone.iso".to_string(),
        ]
    );

    stack.pop();
    stack.pop();
    assert_eq!(stack.current().len(), base.len());
}

#[test]
fn test_parallel_sort_is_natural() {
    let pool = WorkerPool::new(4).unwrap();
    let mut items: Vec<String> = (1..=3000).rev().map(|i| format!("/disc {}.iso", i)).collect();
    items.push("/Disc 2.iso".to_string());

    let sorted = parallel_sort(&pool, items.clone()).unwrap();
    let mut expected = items;
    natural_sort(&mut expected);

    assert_eq!(sorted, expected);
    assert_eq!(sorted[0], "/disc 1.iso");
    assert_eq!(sorted[1], "/Disc 2.iso");
    assert_eq!(sorted[10], "/disc 10.iso");
}

#[test]
fn test_batch_counts_every_item() {
    let pool = WorkerPool::new(3).unwrap();
    let items: Vec<String> = (0..250).map(|i| format!("/item{}", i)).collect();
    let cancel = CancelFlag::new();
    let counters = BatchCounters::new();

    let report = run_batch(&pool, OperationKind::Delete, items, &cancel, &counters, |path, _ctx| {
        let n: usize = path.trim_start_matches("/item").parse().unwrap_or(0);
        match n % 5 {
            0 => ItemResult::error(path, OpError::PathNotFound { path: path.to_string() }),
            1 => ItemResult::error(path, OpError::FileExists { path: path.to_string() }),
            _ => ItemResult::success(path, format!("Deleted: {}", path)),
        }
    })
    .unwrap();

    assert_eq!(report.total, 250);
    assert_eq!(report.completed + report.failed, report.total);
    assert_eq!(report.completed, 150);
    assert_eq!(report.skipped, 50);
    assert_eq!(report.errors(), 50);
    assert_eq!(report.messages.successes.len(), 150);
    assert_eq!(counters.processed(), 250);
}
