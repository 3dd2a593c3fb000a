//! Parallel image discovery
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────┐
//!                 │  Traverser               │
//!                 │  - one pool task / root  │
//!                 └────────────┬─────────────┘
//!                              │
//!       ┌──────────────────────┼──────────────────────┐
//!       │                      │                      │
//! ┌─────▼─────┐          ┌─────▼─────┐          ┌─────▼─────┐
//! │  root A   │          │  root B   │          │  root N   │
//! │  DFS walk │          │  DFS walk │          │  DFS walk │
//! │  buffer   │          │  buffer   │          │  buffer   │
//! └─────┬─────┘          └─────┬─────┘          └─────┬─────┘
//!       └──── flush every 100 matches ──► shared paths + errors
//! ```

pub mod traverse;

pub use traverse::{TraversalResult, TraverseOptions, Traverser, DEFAULT_MIN_SIZE, INTERRUPTED_MARKER};
