//! Error types for debsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use debsync_core::{ConfigError, StateId};

/// Failures of the project hierarchy backend.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// A project's upstream cannot be located or read.
    #[error("project {project} is unreachable: {reason}")]
    Unreachable { project: PathBuf, reason: String },

    /// A project that should exist locally does not.
    #[error("project {path} is not present")]
    NotPresent { path: PathBuf },

    /// File content could not be made available locally.
    #[error("content of {path} is not available")]
    ContentUnavailable { path: PathBuf },

    /// A state id with no stored record.
    #[error("unknown archive state {id}")]
    UnknownState { id: StateId },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State record (de)serialization error.
    #[error("state record JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a whole synchronization pass.
///
/// Failures of a single distribution, package, or artifact never surface here;
/// they become outcome records.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the archive configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An error from the hierarchy backend outside of any single unit.
    #[error("hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),
}

/// Convenience constructor for [`HierarchyError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HierarchyError {
    HierarchyError::Io {
        path: path.into(),
        source,
    }
}
