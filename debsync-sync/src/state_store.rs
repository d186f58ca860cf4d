//! State store: content-addressed history of the archive tree.
//!
//! Each recorded state is a JSON document at
//! `<archive>/.debsync/states/<id>.json` holding a SHA-256 digest for every
//! file in the archive (the `.debsync/` directory itself excluded).
//! `<archive>/.debsync/HEAD` names the newest state.
//! Writes use an atomic `.tmp` + rename pattern.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use debsync_core::{config::META_DIR, StateId};

use crate::error::{io_err, HierarchyError};
use crate::hash_cache::HashCache;

/// Archive tree: relative `/`-separated path → SHA-256 hex digest.
pub type Tree = BTreeMap<String, String>;

/// What produced a state: the command that ran and the inputs it declared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub command: Vec<String>,
    pub inputs: Vec<String>,
}

/// On-disk state record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateRecord {
    pub id: StateId,
    pub parent: Option<StateId>,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    pub files: Tree,
}

/// `<root>/.debsync/states/`
pub fn states_dir_at(root: &Path) -> PathBuf {
    root.join(META_DIR).join("states")
}

/// `<root>/.debsync/states/<id>.json`
pub fn state_path_at(root: &Path, id: &StateId) -> PathBuf {
    states_dir_at(root).join(format!("{}.json", id.0))
}

/// `<root>/.debsync/HEAD`
pub fn head_path_at(root: &Path) -> PathBuf {
    root.join(META_DIR).join("HEAD")
}

/// The newest recorded state, or `None` for an archive with no history.
pub fn head_at(root: &Path) -> Result<Option<StateId>, HierarchyError> {
    let path = head_path_at(root);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let id = raw.trim();
    if id.is_empty() {
        return Ok(None);
    }
    Ok(Some(StateId::from(id)))
}

/// Load one state record.
pub fn load_at(root: &Path, id: &StateId) -> Result<StateRecord, HierarchyError> {
    let path = state_path_at(root, id);
    if !path.exists() {
        return Err(HierarchyError::UnknownState { id: id.clone() });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// The tree of state `id`, or an empty tree for `None`.
pub fn tree_at(root: &Path, id: Option<&StateId>) -> Result<Tree, HierarchyError> {
    match id {
        Some(id) => Ok(load_at(root, id)?.files),
        None => Ok(Tree::new()),
    }
}

/// Save a state record atomically.
pub fn save_at(root: &Path, record: &StateRecord) -> Result<(), HierarchyError> {
    let dir = states_dir_at(root);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = state_path_at(root, &record.id);
    let json = serde_json::to_string_pretty(record)?;
    write_atomic(&path, json.as_bytes())
}

/// The first state, walking back from HEAD, for which `touched(record,
/// parent)` holds. At most two records are held in memory at a time.
pub fn find_back_at<F>(root: &Path, mut touched: F) -> Result<Option<StateId>, HierarchyError>
where
    F: FnMut(&StateRecord, Option<&StateRecord>) -> bool,
{
    let Some(head) = head_at(root)? else {
        return Ok(None);
    };
    let mut current = load_at(root, &head)?;
    loop {
        let parent = match &current.parent {
            Some(id) => Some(load_at(root, id)?),
            None => None,
        };
        if touched(&current, parent.as_ref()) {
            return Ok(Some(current.id));
        }
        match parent {
            Some(parent) => current = parent,
            None => return Ok(None),
        }
    }
}

/// All recorded states, newest first.
pub fn history_at(root: &Path) -> Result<Vec<StateRecord>, HierarchyError> {
    let mut out = Vec::new();
    let mut next = head_at(root)?;
    while let Some(id) = next {
        let record = load_at(root, &id)?;
        next = record.parent.clone();
        out.push(record);
    }
    Ok(out)
}

/// Snapshot the current archive tree and record it as a new state.
///
/// Returns `None` without writing anything when the tree is identical to the
/// one recorded at HEAD.
pub fn record_at(
    root: &Path,
    message: &str,
    provenance: Option<Provenance>,
) -> Result<Option<StateRecord>, HierarchyError> {
    let parent = head_at(root)?;
    let mut cache = HashCache::load_at(root);
    let files = snapshot_cached(root, root, &mut cache)?;
    cache.retain(|key| files.contains_key(key));
    cache.save_at(root)?;
    if let Some(parent_id) = &parent {
        if load_at(root, parent_id)?.files == files {
            tracing::debug!("nothing to record for '{message}'");
            return Ok(None);
        }
    }

    let recorded_at = Utc::now();
    let id = state_digest(parent.as_ref(), message, recorded_at, &files);
    let record = StateRecord {
        id,
        parent,
        message: message.to_string(),
        recorded_at,
        provenance,
        files,
    };
    save_at(root, &record)?;
    write_atomic(&head_path_at(root), record.id.0.as_bytes())?;
    tracing::debug!("recorded state {}: {message}", record.id.short());
    Ok(Some(record))
}

/// Hash every file below `root`, skipping the metadata directory.
pub fn snapshot_tree(root: &Path) -> Result<Tree, HierarchyError> {
    snapshot_under(root, root)
}

/// Hash every file below `dir`, keyed relative to `root`.
///
/// A missing `dir` yields an empty tree.
pub fn snapshot_under(root: &Path, dir: &Path) -> Result<Tree, HierarchyError> {
    walk_tree(root, dir, None)
}

/// Like [`snapshot_under`], reusing digests from `cache` for files whose
/// size and mtime are unchanged.
pub fn snapshot_cached(
    root: &Path,
    dir: &Path,
    cache: &mut HashCache,
) -> Result<Tree, HierarchyError> {
    walk_tree(root, dir, Some(cache))
}

fn walk_tree(
    root: &Path,
    dir: &Path,
    mut cache: Option<&mut HashCache>,
) -> Result<Tree, HierarchyError> {
    let mut tree = Tree::new();
    if !dir.exists() {
        return Ok(tree);
    }
    let meta = root.join(META_DIR);
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.path() != meta);
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            io_err(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = rel_key(root, entry.path());
        let digest = match cache.as_deref_mut() {
            Some(cache) => {
                let metadata = entry.metadata().map_err(|e| {
                    let path = entry.path().to_path_buf();
                    io_err(path, e.into())
                })?;
                cache.digest(&key, entry.path(), &metadata)?
            }
            None => hash_file(entry.path())?,
        };
        tree.insert(key, digest);
    }
    Ok(tree)
}

/// The entries of `tree` at or below the relative `scope`.
pub fn scoped<'a>(tree: &'a Tree, scope: &str) -> impl Iterator<Item = (&'a String, &'a String)> {
    let prefix = if scope.is_empty() {
        String::new()
    } else {
        format!("{scope}/")
    };
    let scope = scope.to_string();
    tree.iter()
        .filter(move |(k, _)| prefix.is_empty() || k.starts_with(&prefix) || **k == scope)
}

/// Relative, `/`-separated key for `path` under `root`.
pub fn rel_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn hash_file(path: &Path) -> Result<String, HierarchyError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

fn state_digest(
    parent: Option<&StateId>,
    message: &str,
    recorded_at: DateTime<Utc>,
    files: &Tree,
) -> StateId {
    let mut h = Sha256::new();
    h.update(parent.map(|p| p.0.as_str()).unwrap_or_default().as_bytes());
    h.update(b"\n");
    h.update(message.as_bytes());
    h.update(b"\n");
    h.update(recorded_at.to_rfc3339().as_bytes());
    h.update(b"\n");
    for (path, digest) in files {
        h.update(path.as_bytes());
        h.update(b"\0");
        h.update(digest.as_bytes());
        h.update(b"\n");
    }
    StateId(hex::encode(h.finalize()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), HierarchyError> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
