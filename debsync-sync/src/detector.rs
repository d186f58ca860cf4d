//! Change detection relative to the watermark.
//!
//! Every query diffs against the same archive-wide watermark, including the
//! ones scoped to nested projects.

use std::collections::BTreeMap;
use std::path::PathBuf;

use debsync_core::{ArchiveConfig, ArtifactKind, PackageName, StateId};

use crate::error::HierarchyError;
use crate::hierarchy::{EntryKind, Hierarchy};
use crate::walker::Distribution;

/// A package project under a distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: PackageName,
    /// Absolute path of the package project.
    pub path: PathBuf,
}

/// Distributions among `tracked` that changed since `watermark`.
pub fn changed_distributions<H: Hierarchy + ?Sized>(
    hierarchy: &H,
    config: &ArchiveConfig,
    watermark: Option<&StateId>,
    tracked: &[Distribution],
) -> Result<Vec<Distribution>, HierarchyError> {
    let layer = hierarchy.root().join(&config.distributions_dir);
    let entries = hierarchy.diff(watermark, &layer, 0)?;

    Ok(tracked
        .iter()
        .filter(|dist| {
            entries.iter().any(|e| {
                e.kind == EntryKind::Project && e.is_present_change() && e.path == dist.path
            })
        })
        .cloned()
        .collect())
}

/// Package projects of `dist` with added or modified content since
/// `watermark`. Packages whose only changes are deletions are left out.
pub fn changed_packages<H: Hierarchy + ?Sized>(
    hierarchy: &H,
    config: &ArchiveConfig,
    dist: &Distribution,
    watermark: Option<&StateId>,
) -> Result<Vec<Package>, HierarchyError> {
    let scope = hierarchy.root().join(config.packages_path(&dist.name));
    let entries = hierarchy.diff(watermark, &scope, 1)?;

    let mut packages: BTreeMap<PathBuf, bool> = BTreeMap::new();
    for entry in entries {
        // Files of the distribution project itself.
        if entry.project == dist.path || !entry.project.starts_with(&scope) {
            continue;
        }
        *packages.entry(entry.project).or_default() |= entry.is_present_change();
    }

    Ok(packages
        .into_iter()
        .filter(|(_, present)| *present)
        .filter_map(|(path, _)| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some(Package {
                name: PackageName::from(name),
                path,
            })
        })
        .collect())
}

/// Added or modified artifact files of `package`, in diff order.
pub fn changed_files<H: Hierarchy + ?Sized>(
    hierarchy: &H,
    package: &Package,
    watermark: Option<&StateId>,
) -> Result<Vec<PathBuf>, HierarchyError> {
    Ok(hierarchy
        .diff(watermark, &package.path, 2)?
        .into_iter()
        .filter(|e| e.kind == EntryKind::File && e.is_present_change())
        .filter(|e| ArtifactKind::from_path(&e.path).is_some())
        .map(|e| e.path)
        .collect())
}
