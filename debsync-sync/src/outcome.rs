//! Outcome records streamed back to the caller of a pass.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use debsync_core::{ArtifactKind, Codename};

use crate::state_store::rel_key;

/// Action label of a distribution refresh.
pub const REFRESH_ACTION: &str = "update.refresh";

/// Coarse result class of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    /// The unit was attempted and failed.
    Error,
    /// The unit was refused before any attempt.
    Impossible,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Error => write!(f, "error"),
            Status::Impossible => write!(f, "impossible"),
        }
    }
}

/// One unit of work reported by a pass. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A distribution could not be refreshed from its upstream.
    Unavailable { project: PathBuf, reason: String },

    /// The archive tool accepted an artifact.
    Registered {
        kind: ArtifactKind,
        codename: Codename,
        distribution: PathBuf,
        artifact: PathBuf,
    },

    /// The archive tool (or input preparation) failed for an artifact.
    Failed {
        kind: ArtifactKind,
        codename: Codename,
        distribution: PathBuf,
        artifact: PathBuf,
        reason: String,
    },

    /// An artifact was refused before reaching the archive tool.
    Rejected {
        kind: ArtifactKind,
        distribution: PathBuf,
        artifact: PathBuf,
        reason: String,
    },
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Registered { .. } => Status::Ok,
            Outcome::Unavailable { .. } | Outcome::Failed { .. } => Status::Error,
            Outcome::Rejected { .. } => Status::Impossible,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Outcome::Unavailable { .. } => REFRESH_ACTION,
            Outcome::Registered { kind, .. }
            | Outcome::Failed { kind, .. }
            | Outcome::Rejected { kind, .. } => kind.action(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Status::Ok
    }

    /// The artifact this outcome is about, if any.
    pub fn artifact(&self) -> Option<&Path> {
        match self {
            Outcome::Unavailable { .. } => None,
            Outcome::Registered { artifact, .. }
            | Outcome::Failed { artifact, .. }
            | Outcome::Rejected { artifact, .. } => Some(artifact),
        }
    }

    /// Flatten into the serializable record shape, with paths made relative
    /// to the archive `root`.
    pub fn record(&self, root: &Path) -> OutcomeRecord {
        let (path, message) = match self {
            Outcome::Unavailable { project, reason } => (project, Some(reason.clone())),
            Outcome::Registered { distribution, .. } => (distribution, None),
            Outcome::Failed {
                distribution,
                reason,
                ..
            }
            | Outcome::Rejected {
                distribution,
                reason,
                ..
            } => (distribution, Some(reason.clone())),
        };
        OutcomeRecord {
            status: self.status(),
            action: self.action().to_string(),
            path: rel_key(root, path),
            artifact: self.artifact().map(|a| rel_key(root, a)),
            message,
        }
    }
}

/// Serializable view of an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub status: Status,
    pub action: String,
    /// Distribution (or refreshed project) the outcome belongs to.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
