//! The project hierarchy the engine reads from.
//!
//! The engine never talks to a versioning backend directly. It only needs a
//! backend that can answer "what changed under this path since state T",
//! refresh a project from its upstream, and record a new state.
//! [`LocalHierarchy`](crate::local::LocalHierarchy) is the filesystem
//! implementation.

use std::path::{Path, PathBuf};

use debsync_core::StateId;

use crate::error::HierarchyError;
use crate::state_store::Provenance;

/// Change state of one diff entry relative to the reference state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    Added,
    Modified,
    Deleted,
    /// Only reported by backends that list unchanged entries.
    Unchanged,
}

/// Whether a diff entry is a plain file or a collapsed nested project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Project,
}

/// One entry of [`Hierarchy::diff`]. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: PathBuf,
    pub state: ChangeState,
    pub kind: EntryKind,
    /// The project that owns the entry; for `EntryKind::Project`, the project
    /// itself.
    pub project: PathBuf,
}

impl DiffEntry {
    /// Added or modified, i.e. present and worth ingesting.
    pub fn is_present_change(&self) -> bool {
        matches!(self.state, ChangeState::Added | ChangeState::Modified)
    }
}

/// Backend interface for a hierarchy of nested, versioned projects.
pub trait Hierarchy {
    /// Root of the top-level (archive) project.
    fn root(&self) -> &Path;

    /// Make the project structure at `path` locally available without
    /// necessarily fetching file content.
    fn ensure_present(&mut self, path: &Path) -> Result<(), HierarchyError>;

    /// Force `project` to exactly match its upstream, discarding local edits.
    fn reset_to_upstream(&mut self, project: &Path, recursive: bool)
        -> Result<(), HierarchyError>;

    /// Record the current tree as a new state. `None` when nothing changed.
    fn record_state(
        &mut self,
        message: &str,
        provenance: Option<Provenance>,
    ) -> Result<Option<StateId>, HierarchyError>;

    /// The most recent state whose change touched `scope`.
    fn last_state_touching(&self, scope: &Path) -> Result<Option<StateId>, HierarchyError>;

    /// Changes under `scope` since `from` (`None` = the empty state), recursing
    /// at most `depth` nested project levels below the scope's own project.
    fn diff(
        &self,
        from: Option<&StateId>,
        scope: &Path,
        depth: usize,
    ) -> Result<Vec<DiffEntry>, HierarchyError>;

    /// Fetch the full content of `path`.
    fn materialize(&mut self, path: &Path) -> Result<(), HierarchyError>;
}
