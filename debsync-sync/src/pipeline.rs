//! Staged ingestion of one package.
//!
//! Planning walks the stages in order (manifests, sources, then leftover
//! binaries) and shrinks the package's [`CandidateSet`] as each artifact
//! claims its inputs. Execution hands each planned registration to the
//! archive tool and records the resulting archive state.

use std::path::{Path, PathBuf};

use debsync_core::{ArtifactKind, Codename};

use crate::adapter::{ArchiveTool, RegisterRequest};
use crate::classifier;
use crate::hierarchy::Hierarchy;
use crate::outcome::Outcome;
use crate::state_store::{rel_key, Provenance};
use crate::walker::Distribution;

// ---------------------------------------------------------------------------
// Candidate set
// ---------------------------------------------------------------------------

/// Changed files of one package that no stage has consumed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    files: Vec<PathBuf>,
}

impl CandidateSet {
    /// Build from changed files, keeping first-seen order.
    pub fn new(files: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut set = Self::default();
        for file in files {
            if !set.contains(&file) {
                set.files.push(file);
            }
        }
        set
    }

    /// Remaining files of `kind`, in candidate order.
    pub fn of_kind(&self, kind: ArtifactKind) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|f| ArtifactKind::from_path(f) == Some(kind))
            .cloned()
            .collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path)
    }

    /// Remove `path`; `false` if it was not a candidate.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f != path);
        self.files.len() != before
    }

    /// Remove every path in `paths` that is a candidate; returns how many were.
    pub fn remove_all<'a>(&mut self, paths: impl IntoIterator<Item = &'a PathBuf>) -> usize {
        paths.into_iter().filter(|p| self.remove(p)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// A registration ready to be handed to the archive tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRegistration {
    pub kind: ArtifactKind,
    pub codename: Codename,
    pub distribution: PathBuf,
    pub artifact: PathBuf,
    /// Artifact first, then referenced siblings.
    pub inputs: Vec<PathBuf>,
}

impl PlannedRegistration {
    pub fn request(&self) -> RegisterRequest {
        RegisterRequest {
            kind: self.kind,
            codename: self.codename.clone(),
            artifact: self.artifact.clone(),
            inputs: self.inputs.clone(),
        }
    }
}

/// One planned unit of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Register(PlannedRegistration),
    /// Settled without the archive tool: a rejection or a preparation
    /// failure.
    Settled(Outcome),
}

/// Plan every stage for one package, consuming `candidates`.
///
/// Inputs an artifact claims leave the candidate set before the next artifact
/// is looked at, whether or not the artifact is accepted, so no file is
/// planned twice.
pub fn plan_package<H: Hierarchy + ?Sized>(
    hierarchy: &mut H,
    dist: &Distribution,
    candidates: &mut CandidateSet,
    ignore_distribution_mismatch: bool,
) -> Vec<Step> {
    let codename = dist.codename();
    let mut steps = Vec::new();

    for &kind in ArtifactKind::all() {
        for artifact in candidates.of_kind(kind) {
            // Claimed by an earlier artifact of the same stage.
            if !candidates.contains(&artifact) {
                continue;
            }
            if kind.has_references() {
                if let Err(e) = hierarchy.materialize(&artifact) {
                    candidates.remove(&artifact);
                    tracing::warn!("cannot fetch {}: {e}", artifact.display());
                    steps.push(Step::Settled(Outcome::Failed {
                        kind,
                        codename: codename.clone(),
                        distribution: dist.path.clone(),
                        artifact,
                        reason: e.to_string(),
                    }));
                    continue;
                }
            }

            match classifier::resolve(kind, &artifact, &codename, ignore_distribution_mismatch) {
                Ok(resolved) => {
                    candidates.remove_all(&resolved.inputs);
                    steps.push(Step::Register(PlannedRegistration {
                        kind,
                        codename: codename.clone(),
                        distribution: dist.path.clone(),
                        artifact: resolved.artifact,
                        inputs: resolved.inputs,
                    }));
                }
                Err(rejection) => {
                    candidates.remove_all(&rejection.inputs);
                    tracing::warn!("rejected {}: {}", artifact.display(), rejection.error);
                    steps.push(Step::Settled(Outcome::Rejected {
                        kind,
                        distribution: dist.path.clone(),
                        artifact,
                        reason: rejection.error.to_string(),
                    }));
                }
            }
        }
    }
    steps
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Register one planned artifact and record the archive state it produced.
///
/// Never returns an error: every failure becomes an [`Outcome::Failed`].
pub fn execute<H, T>(hierarchy: &mut H, tool: &mut T, planned: &PlannedRegistration) -> Outcome
where
    H: Hierarchy + ?Sized,
    T: ArchiveTool + ?Sized,
{
    let failed = |reason: String| {
        tracing::warn!("{} {} failed: {reason}", planned.kind.action(), planned.artifact.display());
        Outcome::Failed {
            kind: planned.kind,
            codename: planned.codename.clone(),
            distribution: planned.distribution.clone(),
            artifact: planned.artifact.clone(),
            reason,
        }
    };

    for input in &planned.inputs {
        if let Err(e) = hierarchy.materialize(input) {
            return failed(e.to_string());
        }
    }

    let request = planned.request();
    let command = tool.command_line(&request);
    if let Err(e) = tool.register(&request) {
        return failed(e.to_string());
    }

    let root = hierarchy.root().to_path_buf();
    let artifact_rel = rel_key(&root, &planned.artifact);
    let message = format!(
        "[debsync] {} {} {}",
        planned.kind.action(),
        planned.codename,
        artifact_rel
    );
    let provenance = Provenance {
        command,
        inputs: planned.inputs.iter().map(|p| rel_key(&root, p)).collect(),
    };
    if let Err(e) = hierarchy.record_state(&message, Some(provenance)) {
        return failed(format!("registered, but the archive state was not recorded: {e}"));
    }

    tracing::info!("{} {} -> {}", planned.kind.action(), artifact_rel, planned.codename);
    Outcome::Registered {
        kind: planned.kind,
        codename: planned.codename.clone(),
        distribution: planned.distribution.clone(),
        artifact: planned.artifact.clone(),
    }
}
