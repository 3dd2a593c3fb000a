//! Advisory `flock` guard
//!
//! Locks belong to the open file description, so two threads that each open
//! the index exclude each other exactly like two processes do.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};

/// Pause between non-blocking lock attempts
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Requested lock type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Why a lock could not be taken
#[derive(Debug)]
pub enum LockFailure {
    /// Still held by someone else when the timeout expired
    Contended,
    /// `flock` itself failed
    Io(io::Error),
}

/// Held lock, released on drop
#[derive(Debug)]
pub struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    /// Poll for the lock until `timeout` expires
    pub fn acquire(file: &'a File, mode: LockMode, timeout: Duration) -> Result<Self, LockFailure> {
        let operation = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        } | libc::LOCK_NB;
        let deadline = Instant::now() + timeout;

        loop {
            // SAFETY: the descriptor stays open for the lifetime of `file`
            let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
            if rc == 0 {
                return Ok(Self { file });
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::EWOULDBLOCK || code == libc::EINTR => {
                    if Instant::now() >= deadline {
                        return Err(LockFailure::Contended);
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                _ => return Err(LockFailure::Io(err)),
            }
        }
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        // SAFETY: same descriptor the lock was taken on
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
