//! Filesystem implementation of [`Hierarchy`].
//!
//! Projects are plain directories with a fixed nesting:
//!
//! ```text
//! <archive>/                                   level 0 (archive)
//!   distributions/<dist>/                      level 1 (distribution)
//!   distributions/<dist>/packages/<pkg>/       level 2 (package)
//! ```
//!
//! History comes from the [`state_store`](crate::state_store); distribution
//! upstreams come from `archive.yaml`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use debsync_core::{config, ArchiveConfig, StateId};

use crate::error::{io_err, HierarchyError, SyncError};
use crate::hash_cache::HashCache;
use crate::hierarchy::{ChangeState, DiffEntry, EntryKind, Hierarchy};
use crate::state_store::{self, rel_key, scoped, Provenance, Tree};

/// Directory-backed project hierarchy rooted at an archive.
#[derive(Debug, Clone)]
pub struct LocalHierarchy {
    root: PathBuf,
    config: ArchiveConfig,
}

impl LocalHierarchy {
    pub fn new(root: PathBuf, config: ArchiveConfig) -> Self {
        Self { root, config }
    }

    /// Open the archive at `root`, loading its config.
    pub fn open(root: &Path) -> Result<Self, SyncError> {
        let config = config::load_at(root)?;
        Ok(Self::new(root.to_path_buf(), config))
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Project paths (relative keys) enclosing `rel`, indexed by level.
    /// Index 0 is the archive itself (`""`).
    fn project_chain(&self, rel: &str) -> Vec<String> {
        let parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
        let dists = components(&self.config.distributions_dir);
        let pkgs = components(&self.config.packages_dir);

        let mut chain = vec![String::new()];
        let dist_end = dists.len() + 1;
        if parts.len() <= dist_end || parts[..dists.len()] != dists[..] {
            return chain;
        }
        chain.push(parts[..dist_end].join("/"));

        let pkg_end = dist_end + pkgs.len() + 1;
        if parts.len() > pkg_end && parts[dist_end..dist_end + pkgs.len()] == pkgs[..] {
            chain.push(parts[..pkg_end].join("/"));
        }
        chain
    }

    /// Level of the project a path inside `scope` would belong to.
    fn scope_level(&self, scope_rel: &str) -> usize {
        let probe = if scope_rel.is_empty() {
            "_".to_string()
        } else {
            format!("{scope_rel}/_")
        };
        self.project_chain(&probe).len() - 1
    }

    fn abs(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn rel(&self, path: &Path) -> String {
        if path.is_absolute() {
            rel_key(&self.root, path)
        } else {
            rel_key(Path::new(""), path)
        }
    }

    fn upstream_for(&self, project_rel: &str) -> Option<&Path> {
        self.config
            .distributions
            .iter()
            .find(|d| self.rel(&self.config.distribution_path(&d.name)) == project_rel)
            .map(|d| d.upstream.as_path())
    }

    fn is_package_project(&self, rel: &str) -> bool {
        let chain = self.project_chain(&format!("{rel}/_"));
        chain.len() == 3 && chain[2] == rel
    }
}

impl Hierarchy for LocalHierarchy {
    fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_present(&mut self, path: &Path) -> Result<(), HierarchyError> {
        let rel = self.rel(path);
        let abs = self.abs(&rel);
        if abs.is_dir() {
            return Ok(());
        }
        if self.is_package_project(&rel) {
            return Err(HierarchyError::NotPresent { path: abs });
        }
        std::fs::create_dir_all(&abs).map_err(|e| io_err(&abs, e))
    }

    fn reset_to_upstream(
        &mut self,
        project: &Path,
        recursive: bool,
    ) -> Result<(), HierarchyError> {
        let rel = self.rel(project);
        let target = self.abs(&rel);
        let upstream = self
            .upstream_for(&rel)
            .ok_or_else(|| HierarchyError::Unreachable {
                project: target.clone(),
                reason: "no upstream configured".to_string(),
            })?
            .to_path_buf();
        if !upstream.is_dir() {
            return Err(HierarchyError::Unreachable {
                project: target,
                reason: format!("upstream {} is not a directory", upstream.display()),
            });
        }

        let packages_prefix = format!("{}/", self.rel(&self.config.packages_dir));
        let keep = |key: &str| recursive || !key.starts_with(&packages_prefix);

        let wanted: Tree = state_store::snapshot_under(&upstream, &upstream)?
            .into_iter()
            .filter(|(k, _)| keep(k))
            .collect();
        let present: Tree = state_store::snapshot_under(&target, &target)?
            .into_iter()
            .filter(|(k, _)| keep(k))
            .collect();

        for (key, digest) in &wanted {
            if present.get(key) == Some(digest) {
                continue;
            }
            let src = upstream.join(key);
            let dst = target.join(key);
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            std::fs::copy(&src, &dst).map_err(|e| io_err(&dst, e))?;
        }
        for key in present.keys().filter(|k| !wanted.contains_key(*k)) {
            let stale = target.join(key);
            std::fs::remove_file(&stale).map_err(|e| io_err(&stale, e))?;
        }
        std::fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
        tracing::debug!("reset {} from {}", rel, upstream.display());
        Ok(())
    }

    fn record_state(
        &mut self,
        message: &str,
        provenance: Option<Provenance>,
    ) -> Result<Option<StateId>, HierarchyError> {
        Ok(state_store::record_at(&self.root, message, provenance)?.map(|r| r.id))
    }

    fn last_state_touching(&self, scope: &Path) -> Result<Option<StateId>, HierarchyError> {
        let scope = self.rel(scope);
        state_store::find_back_at(&self.root, |record, parent| {
            let now = scoped(&record.files, &scope);
            match parent {
                Some(parent) => !now.eq(scoped(&parent.files, &scope)),
                None => now.count() > 0,
            }
        })
    }

    fn diff(
        &self,
        from: Option<&StateId>,
        scope: &Path,
        depth: usize,
    ) -> Result<Vec<DiffEntry>, HierarchyError> {
        let scope_rel = self.rel(scope);
        let max_level = self.scope_level(&scope_rel) + depth;

        let old_tree = state_store::tree_at(&self.root, from)?;
        let mut cache = HashCache::load_at(&self.root);
        let new_tree = state_store::snapshot_cached(&self.root, &self.abs(&scope_rel), &mut cache)?;
        cache.save_at(&self.root)?;
        let old: BTreeMap<&String, &String> = scoped(&old_tree, &scope_rel).collect();
        let new: BTreeMap<&String, &String> = scoped(&new_tree, &scope_rel).collect();
        let keys: BTreeSet<&String> = old.keys().chain(new.keys()).copied().collect();

        let mut entries = BTreeMap::new();
        let mut collapsed = BTreeSet::new();
        for key in keys {
            let state = match (old.get(key), new.get(key)) {
                (None, Some(_)) => ChangeState::Added,
                (Some(a), Some(b)) if a != b => ChangeState::Modified,
                (Some(_), None) => ChangeState::Deleted,
                _ => continue,
            };
            let chain = self.project_chain(key);
            if chain.len() - 1 > max_level {
                collapsed.insert(chain[max_level + 1].clone());
                continue;
            }
            let owner = chain.last().cloned().unwrap_or_default();
            entries.insert(
                key.clone(),
                DiffEntry {
                    path: self.abs(key),
                    state,
                    kind: EntryKind::File,
                    project: self.abs(&owner),
                },
            );
        }

        for project in collapsed {
            let had = old.keys().any(|k| k.starts_with(&format!("{project}/")));
            let has = new.keys().any(|k| k.starts_with(&format!("{project}/")));
            let state = match (had, has) {
                (false, _) => ChangeState::Added,
                (true, false) => ChangeState::Deleted,
                (true, true) => ChangeState::Modified,
            };
            let path = self.abs(&project);
            entries.insert(
                project,
                DiffEntry {
                    path: path.clone(),
                    state,
                    kind: EntryKind::Project,
                    project: path,
                },
            );
        }

        Ok(entries.into_values().collect())
    }

    fn materialize(&mut self, path: &Path) -> Result<(), HierarchyError> {
        let abs = self.abs(&self.rel(path));
        if abs.is_file() {
            Ok(())
        } else {
            Err(HierarchyError::ContentUnavailable { path: abs })
        }
    }
}

fn components(path: &Path) -> Vec<String> {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect()
}
