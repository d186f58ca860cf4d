//! One synchronization pass over the whole archive.
//!
//! ```text
//! watermark ─► refresh distributions ─► changed distributions
//!   └─► changed packages ─► candidate files ─► plan stages ─► archive tool
//! ```
//!
//! Outcomes are streamed to a caller-supplied sink as they are produced. The
//! sink decides whether the pass goes on; the engine itself never aborts on a
//! single unit's failure.

use std::ops::ControlFlow;
use std::path::Path;

use debsync_core::{ArchiveConfig, StateId};

use crate::adapter::ArchiveTool;
use crate::detector::{self, Package};
use crate::error::{HierarchyError, SyncError};
use crate::hierarchy::Hierarchy;
use crate::outcome::Outcome;
use crate::pipeline::{self, CandidateSet, Step};
use crate::walker::{self, Distribution};
use crate::watermark;

/// Everything a pass produced.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Watermark the pass diffed against.
    pub watermark: Option<StateId>,
    pub outcomes: Vec<Outcome>,
    /// The sink asked to stop before the pass was complete.
    pub stopped: bool,
}

impl PassReport {
    /// No outcome other than `ok`.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(Outcome::is_ok)
    }

    fn emit<F>(&mut self, outcome: Outcome, sink: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&Outcome) -> ControlFlow<()>,
    {
        let flow = sink(&outcome);
        self.outcomes.push(outcome);
        if flow.is_break() {
            self.stopped = true;
        }
        flow
    }
}

/// Planned work for one changed package.
#[derive(Debug, Clone)]
pub struct PackagePlan {
    pub distribution: Distribution,
    pub package: Package,
    pub steps: Vec<Step>,
}

/// Run one pass: refresh, detect, classify, register.
///
/// Returns `Err` only when the archive as a whole cannot be inspected: the
/// watermark or the distribution layer. Everything scoped to one
/// distribution, package or artifact is reported through `sink`.
pub fn update_archive<H, T, F>(
    hierarchy: &mut H,
    config: &ArchiveConfig,
    tool: &mut T,
    mut sink: F,
) -> Result<PassReport, SyncError>
where
    H: Hierarchy + ?Sized,
    T: ArchiveTool + ?Sized,
    F: FnMut(&Outcome) -> ControlFlow<()>,
{
    // Read once; the refresh below must not move it.
    let watermark = watermark::current(hierarchy, config)?;
    match &watermark {
        Some(id) => tracing::debug!("using archive update ref {}", id.short()),
        None => tracing::debug!("archive never published; diffing against the empty state"),
    }
    let mut report = PassReport {
        watermark: watermark.clone(),
        ..PassReport::default()
    };
    let wm = watermark.as_ref();

    let refresh = walker::refresh_distributions(hierarchy, config)?;
    for failure in refresh.failures {
        if report.emit(failure, &mut sink).is_break() {
            return Ok(report);
        }
    }

    let ignore = config.tool.ignore_distribution_mismatch;
    for dist in detector::changed_distributions(hierarchy, config, wm, &refresh.distributions)? {
        tracing::debug!("updating from {}", dist.name);
        let packages = match detector::changed_packages(hierarchy, config, &dist, wm) {
            Ok(packages) => packages,
            Err(e) => {
                tracing::warn!("cannot list changes of {}: {e}", dist.name);
                let outcome = unavailable(&dist.path, &e);
                if report.emit(outcome, &mut sink).is_break() {
                    return Ok(report);
                }
                continue;
            }
        };
        for package in packages {
            if let Err(e) = hierarchy.ensure_present(&package.path) {
                tracing::warn!("package {} unavailable: {e}", package.name);
                let outcome = unavailable(&package.path, &e);
                if report.emit(outcome, &mut sink).is_break() {
                    return Ok(report);
                }
                continue;
            }

            let files = match detector::changed_files(hierarchy, &package, wm) {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!("cannot list changes of {}: {e}", package.name);
                    let outcome = unavailable(&package.path, &e);
                    if report.emit(outcome, &mut sink).is_break() {
                        return Ok(report);
                    }
                    continue;
                }
            };
            if files.is_empty() {
                continue;
            }
            tracing::debug!("{} changed file(s) in {}", files.len(), package.name);
            let mut candidates = CandidateSet::new(files);
            for step in pipeline::plan_package(hierarchy, &dist, &mut candidates, ignore) {
                let outcome = match step {
                    Step::Register(planned) => pipeline::execute(hierarchy, tool, &planned),
                    Step::Settled(outcome) => outcome,
                };
                if report.emit(outcome, &mut sink).is_break() {
                    return Ok(report);
                }
            }
        }
    }
    Ok(report)
}

/// Dry run: what the next pass would register, without refreshing anything,
/// invoking the tool, or recording a state.
///
/// Distributions are taken as they are on disk, so upstream changes not yet
/// pulled in are not visible here.
pub fn plan_archive<H>(
    hierarchy: &mut H,
    config: &ArchiveConfig,
) -> Result<Vec<PackagePlan>, SyncError>
where
    H: Hierarchy + ?Sized,
{
    let watermark = watermark::current(hierarchy, config)?;
    let wm = watermark.as_ref();
    let present: Vec<Distribution> = walker::configured_distributions(hierarchy, config)
        .into_iter()
        .filter(|d| d.path.is_dir())
        .collect();

    let mut plans = Vec::new();
    for dist in detector::changed_distributions(hierarchy, config, wm, &present)? {
        let packages = match detector::changed_packages(hierarchy, config, &dist, wm) {
            Ok(packages) => packages,
            Err(e) => {
                tracing::warn!("cannot list changes of {}: {e}", dist.name);
                continue;
            }
        };
        for package in packages {
            let files = match detector::changed_files(hierarchy, &package, wm) {
                Ok(files) => files,
                Err(e) => {
                    let steps = vec![Step::Settled(unavailable(&package.path, &e))];
                    plans.push(PackagePlan {
                        distribution: dist.clone(),
                        package,
                        steps,
                    });
                    continue;
                }
            };
            let mut candidates = CandidateSet::new(files);
            if candidates.is_empty() {
                continue;
            }
            let steps = pipeline::plan_package(
                hierarchy,
                &dist,
                &mut candidates,
                config.tool.ignore_distribution_mismatch,
            );
            plans.push(PackagePlan {
                distribution: dist.clone(),
                package,
                steps,
            });
        }
    }
    Ok(plans)
}

fn unavailable(project: &Path, error: &HierarchyError) -> Outcome {
    Outcome::Unavailable {
        project: project.to_path_buf(),
        reason: error.to_string(),
    }
}
