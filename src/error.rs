//! Error types for iso-commander
//!
//! This module defines the error hierarchy that covers:
//! - Index file (open, lock, read, write) errors
//! - Per-item batch operation errors (copy/move/delete/convert)
//! - Configuration and CLI errors
//! - Worker pool errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Per-item errors carry the path they refer to so they can be shown as-is
//! - Preserve error chains for debugging

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Index file errors
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while reading or writing the on-disk index
#[derive(Error, Debug)]
pub enum IndexError {
    /// The index file could not be opened or created
    #[error("Failed to open index '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    /// Another thread or process held the lock for too long
    #[error("Index '{path}' is busy - another instance may be updating it")]
    LockContention { path: PathBuf },

    /// Reading the index failed
    #[error("Failed to read index '{path}': {reason}")]
    Read { path: PathBuf, reason: String },

    /// Writing the index failed
    #[error("Failed to write index '{path}': {reason}")]
    Write { path: PathBuf, reason: String },

    /// A worker used to check entries failed
    #[error("Index check failed: {0}")]
    Worker(#[from] WorkerError),
}

impl IndexError {
    /// Check if retrying the whole operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexError::LockContention { .. })
    }
}

/// Per-item failure reasons for batch operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    /// Path does not exist
    #[error("Path not found: '{path}'")]
    PathNotFound { path: String },

    /// Permission denied
    #[error("Permission denied: '{path}'")]
    PermissionDenied { path: String },

    /// Source and target are the same file
    #[error("Source and destination are the same file: '{path}'")]
    SameFile { path: String },

    /// Destination is not an existing directory
    #[error("Invalid destination: '{path}' is not a directory")]
    InvalidDestination { path: String },

    /// Target exists and overwriting was not requested
    #[error("File already exists: '{path}'")]
    FileExists { path: String },

    /// Source disappeared after it was selected
    #[error("Source file no longer exists: '{path}'")]
    SourceMissing { path: String },

    /// Generic read/write failure
    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    /// Cancelled by the user
    #[error("Cancelled: '{path}'")]
    Cancelled { path: String },

    /// Input is not a format any converter handles
    #[error("Unsupported image format: '{path}'")]
    UnsupportedFormat { path: String },

    /// External converter returned an error
    #[error("Conversion of '{path}' failed: {reason}")]
    ConverterFailed { path: String, reason: String },
}

impl OpError {
    /// Classify an I/O error raised while working on `path`
    pub fn from_io(path: impl Into<String>, err: &io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => OpError::PathNotFound { path },
            io::ErrorKind::PermissionDenied => OpError::PermissionDenied { path },
            _ => OpError::Io {
                path,
                reason: err.to_string(),
            },
        }
    }

    /// Skips are outcomes where nothing was attempted because the
    /// result would be pointless or destructive
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            OpError::SameFile { .. } | OpError::FileExists { .. } | OpError::UnsupportedFormat { .. }
        )
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid index capacity
    #[error("Invalid index capacity {count}: must be between {min} and {max}")]
    InvalidMaxEntries { count: usize, min: usize, max: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Index path error
    #[error("Invalid index path '{path}': {reason}")]
    InvalidIndexPath { path: PathBuf, reason: String },

    /// Destination list error
    #[error("Invalid destination list '{list}': {reason}")]
    InvalidDestinations { list: String, reason: String },
}

/// Worker pool errors
#[derive(Error, Debug, Clone)]
pub enum WorkerError {
    /// Task panicked
    #[error("Task panicked: {message}")]
    Panicked { message: String },

    /// The pool shut down before the task produced a result
    #[error("Worker pool shut down before the task completed")]
    Disconnected,

    /// Worker thread could not be started
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },
}

/// Result type alias for EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for IndexError
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Result type alias for OpError
pub type OpResult<T> = std::result::Result<T, OpError>;

/// Represents the outcome of processing a single batch item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Action performed
    Succeeded { path: String, message: String },

    /// Nothing attempted
    Skipped { path: String, reason: OpError },

    /// Attempted and failed
    Failed { path: String, reason: OpError },
}

impl OperationOutcome {
    /// Build the outcome for a per-item error, splitting skips from failures
    pub fn from_error(path: impl Into<String>, reason: OpError) -> Self {
        let path = path.into();
        if reason.is_skip() {
            OperationOutcome::Skipped { path, reason }
        } else {
            OperationOutcome::Failed { path, reason }
        }
    }

    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Succeeded { .. })
    }

    /// Returns the path associated with this outcome
    pub fn path(&self) -> &str {
        match self {
            OperationOutcome::Succeeded { path, .. } => path,
            OperationOutcome::Skipped { path, .. } => path,
            OperationOutcome::Failed { path, .. } => path,
        }
    }
}
