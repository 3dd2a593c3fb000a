//! Fixed-size worker pool
//!
//! Every bulk operation in the crate (traversal, index pruning, batch
//! copy/move/delete, conversion, filtering, sorting) runs through one pool
//! so concurrency is bounded by the worker count instead of by the size of
//! the selection.
//!
//! # Architecture
//!
//! ```text
//!   foreground thread
//!        │ enqueue(task) ──► TaskHandle ──► wait()
//!        ▼
//!  ┌──────────────────────┐
//!  │  Job queue           │  crossbeam unbounded, FIFO
//!  └──────────┬───────────┘
//!     ┌───────┼────────┐
//!     ▼       ▼        ▼
//!  pool-0  pool-1 … pool-N      each job sends its result (or panic
//!                               message) back on a one-shot channel
//! ```
//!
//! Submission never blocks. Callers that fan out many tasks use
//! [`WorkerPool::run_bounded`], which keeps at most `size()` tasks in flight.

use crate::error::WorkerError;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::any::Any;
use std::collections::VecDeque;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the result of a task submitted with [`WorkerPool::enqueue`]
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes
    ///
    /// Returns `WorkerError::Panicked` if the task panicked, and
    /// `WorkerError::Disconnected` if the pool dropped it unexecuted.
    pub fn wait(self) -> Result<T, WorkerError> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(WorkerError::Panicked { message }),
            Err(_) => Err(WorkerError::Disconnected),
        }
    }
}

/// Pool of worker threads consuming a shared FIFO queue
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` workers (at least one)
    pub fn new(size: usize) -> Result<Self, WorkerError> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("pool-{}", id))
                .spawn(move || worker_loop(receiver))
                .map_err(|e| WorkerError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }

        debug!(workers = size, "Worker pool started");

        Ok(Self {
            sender: Some(sender),
            workers,
            size,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.size
    }

    /// Submit a task; never blocks
    pub fn enqueue<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task)).map_err(panic_message);
            let _ = tx.send(result);
        });

        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                debug!("Task submitted to a stopped pool");
            }
        }

        TaskHandle { receiver: rx }
    }

    /// Run every task with at most `size()` of them in flight
    ///
    /// Results come back in submission order. Must be called from outside
    /// the pool; a worker waiting on its own pool can deadlock.
    pub fn run_bounded<I, F, T>(&self, tasks: I) -> Vec<Result<T, WorkerError>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut in_flight: VecDeque<TaskHandle<T>> = VecDeque::with_capacity(self.size);
        let mut results = Vec::new();

        for task in tasks {
            if in_flight.len() >= self.size {
                if let Some(oldest) = in_flight.pop_front() {
                    results.push(oldest.wait());
                }
            }
            in_flight.push_back(self.enqueue(task));
        }

        results.extend(in_flight.into_iter().map(TaskHandle::wait));
        results
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain what is queued, then exit
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread exited abnormally");
            }
        }
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        job();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Split `0..len` into at most `parts` contiguous, non-empty ranges
pub fn chunk_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, len);
    let chunk = len.div_ceil(parts);
    (0..len)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(len))
        .collect()
}
