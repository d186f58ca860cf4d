//! Error types for debsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from archive configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and serde_yaml line context.
    #[error("failed to parse archive config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No `archive.yaml` where one was expected.
    #[error("archive config not found at {path}; run `debsync init` first")]
    NotFound { path: PathBuf },

    /// A distribution name that cannot be used as a directory name.
    #[error("invalid distribution name '{name}'")]
    InvalidName { name: String },

    /// A distribution is already registered with a different upstream.
    #[error("distribution '{name}' already registered with upstream {existing}")]
    DuplicateDistribution { name: String, existing: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
