//! Per-archive YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! <archive>/
//!   .debsync/
//!     archive.yaml      (mode 0600)
//!   distributions/      (one directory per tracked distribution)
//!   www/                (published output written by the archive tool)
//! ```
//!
//! Every function takes the archive root explicitly; the CLI resolves it from
//! `--archive` or the working directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{DistributionEntry, DistributionName};

/// Name of the metadata directory inside an archive.
pub const META_DIR: &str = ".debsync";

const CONFIG_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// How the external archive tool is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable name or path.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the operation (e.g. `["-b", "."]`).
    #[serde(default)]
    pub args: Vec<String>,
    /// Accept `.changes` files whose `Distribution` disagrees with the
    /// target codename instead of rejecting them.
    #[serde(default)]
    pub ignore_distribution_mismatch: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            ignore_distribution_mismatch: false,
        }
    }
}

fn default_program() -> String {
    "reprepro".to_string()
}

fn default_published_dir() -> PathBuf {
    PathBuf::from("www")
}

fn default_distributions_dir() -> PathBuf {
    PathBuf::from("distributions")
}

fn default_packages_dir() -> PathBuf {
    PathBuf::from("packages")
}

/// Root of `archive.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub version: u32,
    /// Output area of the archive tool; the only input to the watermark.
    #[serde(default = "default_published_dir")]
    pub published_dir: PathBuf,
    #[serde(default = "default_distributions_dir")]
    pub distributions_dir: PathBuf,
    /// Subdirectory of each distribution holding package projects.
    #[serde(default = "default_packages_dir")]
    pub packages_dir: PathBuf,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub distributions: Vec<DistributionEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArchiveConfig {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: CONFIG_VERSION,
            published_dir: default_published_dir(),
            distributions_dir: default_distributions_dir(),
            packages_dir: default_packages_dir(),
            tool: ToolConfig::default(),
            distributions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Relative path of a distribution project inside the archive.
    pub fn distribution_path(&self, name: &DistributionName) -> PathBuf {
        self.distributions_dir.join(&name.0)
    }

    /// Relative path of the package layer of a distribution.
    pub fn packages_path(&self, name: &DistributionName) -> PathBuf {
        self.distribution_path(name).join(&self.packages_dir)
    }

    pub fn distribution(&self, name: &DistributionName) -> Option<&DistributionEntry> {
        self.distributions.iter().find(|d| &d.name == name)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/.debsync/archive.yaml` (pure, no I/O).
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(META_DIR).join("archive.yaml")
}

/// `<root>/.debsync/`, created (mode `0700`) if absent.
pub fn meta_dir_at(root: &Path) -> Result<PathBuf, ConfigError> {
    let dir = root.join(META_DIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// Load `archive.yaml` for the archive at `root`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// and line context) if malformed.
pub fn load_at(root: &Path) -> Result<ArchiveConfig, ConfigError> {
    let path = config_path_at(root);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: ArchiveConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    for entry in &config.distributions {
        validate_name(&entry.name)?;
    }
    Ok(config)
}

/// Atomically save `archive.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(root: &Path, config: &ArchiveConfig) -> Result<(), ConfigError> {
    meta_dir_at(root)?;
    let path = config_path_at(root);
    let tmp_path = path.with_file_name("archive.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Set up an archive at `root`.
///
/// Creates the metadata, distributions and published directories and writes a
/// default config. Idempotent: an existing config is loaded and returned
/// unchanged.
pub fn init_at(root: &Path) -> Result<ArchiveConfig, ConfigError> {
    if config_path_at(root).exists() {
        return load_at(root);
    }

    let config = ArchiveConfig::new();
    for dir in [&config.distributions_dir, &config.published_dir] {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    save_at(root, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 5. Distributions
// ---------------------------------------------------------------------------

/// Register a distribution mirrored from `upstream`.
///
/// Idempotent for an identical entry; a different upstream for an existing
/// name is `DuplicateDistribution`.
pub fn add_distribution_at(
    root: &Path,
    name: DistributionName,
    upstream: PathBuf,
) -> Result<ArchiveConfig, ConfigError> {
    validate_name(&name)?;
    let mut config = load_at(root)?;

    if let Some(existing) = config.distribution(&name) {
        if existing.upstream == upstream {
            return Ok(config);
        }
        return Err(ConfigError::DuplicateDistribution {
            name: name.0,
            existing: existing.upstream.clone(),
        });
    }

    config.distributions.push(DistributionEntry { name, upstream });
    config.distributions.sort_by(|a, b| a.name.cmp(&b.name));
    config.updated_at = Utc::now();
    save_at(root, &config)?;
    Ok(config)
}

fn validate_name(name: &DistributionName) -> Result<(), ConfigError> {
    let raw = name.0.as_str();
    let invalid = raw.is_empty()
        || raw == "."
        || raw == ".."
        || raw.contains('/')
        || raw.contains('\\')
        || raw.starts_with('-')
        || raw.contains(char::is_whitespace)
        || name.codename().0.is_empty();
    if invalid {
        return Err(ConfigError::InvalidName {
            name: raw.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_path_is_correct() {
        let root = TempDir::new().expect("tempdir");
        let path = config_path_at(root.path());
        assert!(path.ends_with(".debsync/archive.yaml"));
    }

    #[test]
    fn init_creates_layout() {
        let root = TempDir::new().expect("tempdir");
        let config = init_at(root.path()).expect("init");
        assert!(root.path().join("distributions").is_dir());
        assert!(root.path().join("www").is_dir());
        assert_eq!(config.version, 1);
        assert_eq!(config.tool.program, "reprepro");
    }

    #[test]
    fn meta_dir_created_with_perms() {
        let root = TempDir::new().expect("tempdir");
        let dir = meta_dir_at(root.path()).expect("meta dir");
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn distribution_paths_follow_layout() {
        let config = ArchiveConfig::new();
        let name = DistributionName::from("bullseye-nonfree");
        assert_eq!(
            config.packages_path(&name),
            PathBuf::from("distributions/bullseye-nonfree/packages")
        );
    }

    #[test]
    fn add_distribution_keeps_entries_sorted() {
        let root = TempDir::new().expect("tempdir");
        init_at(root.path()).expect("init");
        add_distribution_at(root.path(), "trixie".into(), PathBuf::from("/up/trixie"))
            .expect("add trixie");
        let config =
            add_distribution_at(root.path(), "bookworm".into(), PathBuf::from("/up/bookworm"))
                .expect("add bookworm");
        let names: Vec<_> = config.distributions.iter().map(|d| d.name.0.as_str()).collect();
        assert_eq!(names, vec!["bookworm", "trixie"]);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let root = TempDir::new().expect("tempdir");
        init_at(root.path()).expect("init");
        for bad in ["", "..", "a/b", "-x", "-nonfree", "bull seye"] {
            let err = add_distribution_at(root.path(), bad.into(), PathBuf::from("/up"))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidName { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn tool_defaults_fill_missing_fields() {
        let yaml = "version: 1\ncreated_at: 2024-01-01T00:00:00Z\nupdated_at: 2024-01-01T00:00:00Z\n";
        let config: ArchiveConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.tool, ToolConfig::default());
        assert_eq!(config.published_dir, PathBuf::from("www"));
        assert!(config.distributions.is_empty());
    }
}
