//! Core error types for rostersync-core.
//!
//! Store-level failures are reported as [`StoreError`]. The engine wraps them
//! into [`SyncError`] according to which stage of a pass failed, so the
//! operator can tell a dead source apart from a failed write.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for callers that touch config, stores and the engine.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Reconciliation errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a source or target store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open a database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database stayed locked past the busy timeout
    #[error("Database is locked")]
    Locked,

    /// The running statement was interrupted (run timeout)
    #[error("Statement interrupted")]
    Interrupted,

    /// A thread panicked while holding the connection
    #[error("Connection mutex poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Which half of the applier a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPath {
    Add,
    Remove,
}

impl std::fmt::Display for ApplyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyPath::Add => f.write_str("add"),
            ApplyPath::Remove => f.write_str("remove"),
        }
    }
}

/// Reasons a reconciliation pass was aborted.
///
/// Every variant aborts the whole pass. Nothing is retried in-run; the next
/// scheduled pass recomputes the delta from scratch.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Source store unavailable: {0}")]
    SourceUnavailable(#[source] StoreError),

    #[error("Target store unavailable: {0}")]
    TargetUnavailable(#[source] StoreError),

    #[error("Apply failed on {path} path: {source}")]
    ApplyFailed {
        path: ApplyPath,
        #[source]
        source: StoreError,
    },

    /// Resolved ids after insert did not match the inserted keys 1:1.
    #[error("Inconsistent {path} path: expected {expected} rows, resolved {resolved}")]
    ApplyInconsistency {
        path: ApplyPath,
        expected: usize,
        resolved: usize,
    },

    #[error("Sync pass exceeded {secs}s and was interrupted")]
    Timeout { secs: u64 },

    #[error("Sync pass aborted: {0}")]
    Aborted(String),
}

impl SyncError {
    pub(crate) fn add_failed(source: StoreError) -> Self {
        SyncError::ApplyFailed {
            path: ApplyPath::Add,
            source,
        }
    }

    pub(crate) fn remove_failed(source: StoreError) -> Self {
        SyncError::ApplyFailed {
            path: ApplyPath::Remove,
            source,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => match e.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    StoreError::Locked
                }
                rusqlite::ErrorCode::OperationInterrupted => StoreError::Interrupted,
                _ => StoreError::QueryFailed(err.to_string()),
            },
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
