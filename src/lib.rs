//! iso-commander - Disc Image Discovery, Index and Batch Operations
//!
//! A tool for finding optical-disc images (ISO, and BIN/IMG/MDF/NRG to
//! convert) on local filesystems, keeping a persistent index of them and
//! running bulk copy/move/delete/convert operations on selections.
//!
//! # Features
//!
//! - **Parallel Discovery**: one walk per root on a fixed worker pool, with
//!   extension, size, depth and exclusion filters.
//!
//! - **Safe Shared Index**: a flat text file guarded by `flock`, capped with
//!   oldest-first eviction, never rewritten when nothing changed, and safe
//!   to update from several processes at once.
//!
//! - **Batch Operations**: copy, move, delete and convert across the pool
//!   with per-item success/skip/failure accounting and cooperative
//!   cancellation.
//!
//! - **Fast Lists**: multi-term Boyer-Moore filtering with stackable
//!   filters, and a parallel natural sort.
//!
//! # Architecture
//!
//! ```text
//!   roots ──► Traverser ──► PathIndex (file + flock) ──► IndexMirror
//!                │                ▲                       │ (sorted)
//!                │                │ save / remove         ▼
//!                │                │                  FilterStack
//!                │                │                       │
//!                │                │                  Selection
//!                │                │                       │
//!                │                └──────── batch ◄───────┘
//!                │                     (copy/move/delete/convert)
//!                ▼                            │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                           │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐  │
//! │  │ pool-0  │  │ pool-1  │  │ pool-2  │  ...    │ pool-N  │  │
//! │  └─────────┘  └─────────┘  └─────────┘         └─────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Find images and index them
//! iso-commander import /mnt/games ~/Downloads
//!
//! # Show the index filtered by two terms
//! iso-commander list --filter 'fantasy;turismo'
//!
//! # Copy entries 1-3 of a filtered view to two drives
//! iso-commander copy '1-3' --filter ps2 --dest '/mnt/usb;/mnt/backup'
//! ```

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod ops;
pub mod pool;
pub mod progress;
pub mod search;
pub mod selection;
pub mod sort;
pub mod walker;

pub use cancel::CancelFlag;
pub use config::{CliArgs, EngineConfig};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use pool::WorkerPool;
