//! Persistent path index and history files
//!
//! - `store`: the lock-protected, capped index of image paths
//! - `mirror`: mtime-keyed in-memory snapshot of the index
//! - `history`: most-recent-first folder and filter history
//! - `file`: locked open/read/rewrite shared by the index and the history
//! - `format` / `lock`: line format and `flock` guard shared by all three

mod file;
mod format;
mod history;
mod lock;
mod mirror;
mod store;

pub use history::{LineHistory, FILTER_HISTORY_CAPACITY, FOLDER_HISTORY_CAPACITY};
pub use mirror::IndexMirror;
pub use store::{PathIndex, PruneReport, SaveReport, DEFAULT_MAX_ENTRIES};
