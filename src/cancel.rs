//! Cooperative cancellation
//!
//! A single flag per engine, set from the Ctrl-C handler and polled by
//! traversal and copy loops. Nothing is interrupted preemptively: a read or
//! write already issued completes before the flag is observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a flag that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the flag before starting the next operation
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
