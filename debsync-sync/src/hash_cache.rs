//! Hash cache: skips re-hashing files whose size and mtime are unchanged.
//!
//! Persists a `HashCacheFile` JSON document at
//! `<archive>/.debsync/hash-cache.json`, keyed by the same relative paths as
//! state trees. Writes use the atomic `.tmp` + rename pattern.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use debsync_core::config::META_DIR;

use crate::error::{io_err, HierarchyError};
use crate::state_store::hash_file;

/// Files modified this recently are always re-hashed; a second write within
/// the mtime granularity would otherwise go unnoticed.
const SETTLE: Duration = Duration::from_secs(2);

/// Digest of one file together with the stat data it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedDigest {
    pub size: u64,
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
    pub digest: String,
}

/// On-disk hash cache payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashCacheFile {
    pub updated_at: DateTime<Utc>,
    pub files: HashMap<String, CachedDigest>,
}

/// In-memory cache for one archive root.
#[derive(Debug)]
pub struct HashCache {
    file: HashCacheFile,
    dirty: bool,
}

/// `<root>/.debsync/hash-cache.json`
pub fn cache_path_at(root: &Path) -> PathBuf {
    root.join(META_DIR).join("hash-cache.json")
}

impl HashCache {
    /// Load the cache of `root`. A missing or unreadable cache starts empty.
    pub fn load_at(root: &Path) -> Self {
        let path = cache_path_at(root);
        let file = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| match serde_json::from_str(&contents) {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!("ignoring hash cache {}: {e}", path.display());
                    None
                }
            })
            .unwrap_or_else(|| HashCacheFile {
                updated_at: Utc::now(),
                files: HashMap::new(),
            });
        Self { file, dirty: false }
    }

    /// Digest of `path` (stored under `key`), from the cache when its size
    /// and mtime still match.
    pub fn digest(
        &mut self,
        key: &str,
        path: &Path,
        metadata: &Metadata,
    ) -> Result<String, HierarchyError> {
        let stamp = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok());
        if let (Some(stamp), Some(cached)) = (stamp, self.file.files.get(key)) {
            if cached.size == metadata.len()
                && cached.mtime_secs == stamp.as_secs()
                && cached.mtime_nanos == stamp.subsec_nanos()
            {
                return Ok(cached.digest.clone());
            }
        }

        let digest = hash_file(path)?;
        let settled = stamp.filter(|s| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|now| now.saturating_sub(*s) >= SETTLE)
                .unwrap_or(false)
        });
        match settled {
            Some(stamp) => {
                self.file.files.insert(
                    key.to_string(),
                    CachedDigest {
                        size: metadata.len(),
                        mtime_secs: stamp.as_secs(),
                        mtime_nanos: stamp.subsec_nanos(),
                        digest: digest.clone(),
                    },
                );
            }
            None => {
                self.file.files.remove(key);
            }
        }
        self.dirty = true;
        Ok(digest)
    }

    /// Drop every entry for which `keep` returns false.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.file.files.len();
        self.file.files.retain(|k, _| keep(k));
        if self.file.files.len() != before {
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.file.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.files.is_empty()
    }

    /// Write the cache back if anything changed.
    pub fn save_at(&mut self, root: &Path) -> Result<(), HierarchyError> {
        if !self.dirty {
            return Ok(());
        }
        let path = cache_path_at(root);
        let Some(dir) = path.parent() else {
            return Err(io_err(
                path,
                std::io::Error::other("invalid hash cache path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        self.file.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(&self.file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::fs::FileTimes;
    use tempfile::TempDir;

    fn aged(path: &Path) -> Metadata {
        let old = SystemTime::now() - Duration::from_secs(60);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(old)).unwrap();
        fs::metadata(path).unwrap()
    }

    #[test]
    fn empty_cache_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(HashCache::load_at(tmp.path()).is_empty());
    }

    #[test]
    fn settled_digest_is_reused_after_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pool.deb");
        fs::write(&path, "v1").unwrap();
        let meta = aged(&path);

        let mut cache = HashCache::load_at(tmp.path());
        let first = cache.digest("pool.deb", &path, &meta).unwrap();
        cache.save_at(tmp.path()).unwrap();

        let mut reloaded = HashCache::load_at(tmp.path());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.digest("pool.deb", &path, &meta).unwrap(), first);
        assert!(!cache_path_at(tmp.path()).with_extension("json.tmp").exists());
    }

    #[test]
    fn changed_size_is_rehashed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.dsc");
        fs::write(&path, "v1").unwrap();
        let mut cache = HashCache::load_at(tmp.path());
        let first = cache.digest("a.dsc", &path, &aged(&path)).unwrap();

        fs::write(&path, "version two").unwrap();
        let second = cache.digest("a.dsc", &path, &aged(&path)).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, hash_file(&path).unwrap());
    }

    #[test]
    fn fresh_files_are_not_cached() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("new.deb");
        fs::write(&path, "x").unwrap();
        let mut cache = HashCache::load_at(tmp.path());
        cache
            .digest("new.deb", &path, &fs::metadata(&path).unwrap())
            .unwrap();
        assert!(cache.is_empty());
    }
}
