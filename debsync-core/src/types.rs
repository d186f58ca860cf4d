//! Domain types for a debsync archive.
//!
//! All path fields use `PathBuf`; names are newtypes so a distribution name
//! can never be passed where an archive codename is expected.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a distribution project, `<codename>` or `<codename>-<flavor>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DistributionName(pub String);

impl DistributionName {
    /// The archive codename this distribution feeds: everything before the
    /// first `-`.
    ///
    /// Several flavored distributions (`bullseye-nonfree`, `bullseye-ci`)
    /// converge on one archive target.
    pub fn codename(&self) -> Codename {
        Codename::from(self.0.split('-').next().unwrap_or_default())
    }
}

impl fmt::Display for DistributionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DistributionName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DistributionName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Target codename inside the archive tool (e.g. `bookworm`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Codename(pub String);

impl fmt::Display for Codename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Codename {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Codename {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of a package project nested under a distribution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageName(pub String);

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a recorded archive state (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(pub String);

impl StateId {
    /// Abbreviated form for human output.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for StateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StateId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Artifact kinds
// ---------------------------------------------------------------------------

/// The three kinds of build artifact the archive ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// `.changes`: lists the outputs of one build.
    Manifest,
    /// `.dsc`: lists the constituent files of a source package.
    Source,
    /// `.deb`: standalone installable unit.
    Binary,
}

impl ArtifactKind {
    /// Stage order: manifests first, then sources, then leftover binaries.
    pub fn all() -> &'static [ArtifactKind] {
        &[ArtifactKind::Manifest, ArtifactKind::Source, ArtifactKind::Binary]
    }

    /// Classify a file by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "changes" => Some(ArtifactKind::Manifest),
            "dsc" => Some(ArtifactKind::Source),
            "deb" => Some(ArtifactKind::Binary),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Manifest => "changes",
            ArtifactKind::Source => "dsc",
            ArtifactKind::Binary => "deb",
        }
    }

    /// Action label used in outcome records.
    pub fn action(&self) -> &'static str {
        match self {
            ArtifactKind::Manifest => "register.manifest",
            ArtifactKind::Source => "register.source",
            ArtifactKind::Binary => "register.binary",
        }
    }

    /// Whether artifacts of this kind carry a list of sibling files.
    pub fn has_references(&self) -> bool {
        !matches!(self, ArtifactKind::Binary)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Manifest => write!(f, "manifest"),
            ArtifactKind::Source => write!(f, "source"),
            ArtifactKind::Binary => write!(f, "binary"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration structs
// ---------------------------------------------------------------------------

/// A distribution tracked by the archive and the directory it is reset from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEntry {
    pub name: DistributionName,
    /// Upstream directory the distribution is mirrored from on every update.
    pub upstream: PathBuf,
}
