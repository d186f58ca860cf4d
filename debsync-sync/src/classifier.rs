//! Artifact classification and reference resolution.
//!
//! Turns one candidate file into the full set of inputs the archive tool will
//! read, and refuses descriptors whose embedded metadata disagrees with their
//! filename or target codename.

use std::path::{Path, PathBuf};

use thiserror::Error;

use debsync_core::{ArtifactKind, Codename, DistributionName};

use crate::descriptor::{strip_epoch, Descriptor, DescriptorError};

/// Why a candidate artifact cannot be registered.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unparsable descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("referenced file '{name}' is not a sibling filename")]
    InvalidReference { name: String },

    #[error("filename '{found}' does not match descriptor (expected {expected})")]
    FilenameMismatch { expected: String, found: String },

    #[error("declared distribution '{declared}' does not target codename '{codename}'")]
    DistributionMismatch { declared: String, codename: Codename },
}

/// An artifact with its inputs resolved, ready to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub kind: ArtifactKind,
    pub artifact: PathBuf,
    /// The artifact first, then its referenced siblings in listed order.
    pub inputs: Vec<PathBuf>,
}

/// A refused artifact and every file it claimed.
#[derive(Debug)]
pub struct Rejection {
    pub inputs: Vec<PathBuf>,
    pub error: ClassifyError,
}

/// Resolve `artifact` of `kind` for registration into `codename`.
///
/// Descriptors are read from disk, so their content must already be
/// materialized. Binaries resolve to themselves without any I/O.
pub fn resolve(
    kind: ArtifactKind,
    artifact: &Path,
    codename: &Codename,
    ignore_distribution_mismatch: bool,
) -> Result<ResolvedArtifact, Rejection> {
    let mut inputs = vec![artifact.to_path_buf()];
    if !kind.has_references() {
        return Ok(ResolvedArtifact {
            kind,
            artifact: artifact.to_path_buf(),
            inputs,
        });
    }

    let reject = |inputs: Vec<PathBuf>, error: ClassifyError| Rejection { inputs, error };

    let text = match std::fs::read_to_string(artifact) {
        Ok(text) => text,
        Err(source) => {
            let error = ClassifyError::Read {
                path: artifact.to_path_buf(),
                source,
            };
            return Err(reject(inputs, error));
        }
    };
    let descriptor = Descriptor::parse(&text).map_err(|e| reject(inputs.clone(), e.into()))?;
    let names = descriptor
        .files()
        .map_err(|e| reject(inputs.clone(), e.into()))?;

    let dir = artifact.parent().unwrap_or_else(|| Path::new(""));
    let mut invalid = None;
    for name in names {
        if !is_sibling_name(&name) {
            if invalid.is_none() {
                invalid = Some(ClassifyError::InvalidReference { name });
            }
            continue;
        }
        let path = dir.join(&name);
        if !inputs.contains(&path) {
            inputs.push(path);
        }
    }
    if let Some(error) = invalid {
        return Err(reject(inputs, error));
    }

    if let Err(error) = validate(kind, artifact, &descriptor, codename, ignore_distribution_mismatch)
    {
        return Err(reject(inputs, error));
    }

    Ok(ResolvedArtifact {
        kind,
        artifact: artifact.to_path_buf(),
        inputs,
    })
}

fn validate(
    kind: ArtifactKind,
    artifact: &Path,
    descriptor: &Descriptor,
    codename: &Codename,
    ignore_distribution_mismatch: bool,
) -> Result<(), ClassifyError> {
    let found = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = format!(
        "{}_{}",
        descriptor.source()?,
        strip_epoch(descriptor.version()?)
    );

    match kind {
        ArtifactKind::Source => {
            let expected = format!("{stem}.dsc");
            if found != expected {
                return Err(ClassifyError::FilenameMismatch { expected, found });
            }
        }
        ArtifactKind::Manifest => {
            let prefix = format!("{stem}_");
            if !found.starts_with(&prefix) {
                return Err(ClassifyError::FilenameMismatch {
                    expected: format!("{prefix}*.changes"),
                    found,
                });
            }
            if !ignore_distribution_mismatch {
                for declared in descriptor.distributions() {
                    if &DistributionName::from(declared).codename() != codename {
                        return Err(ClassifyError::DistributionMismatch {
                            declared: declared.to_string(),
                            codename: codename.clone(),
                        });
                    }
                }
            }
        }
        ArtifactKind::Binary => {}
    }
    Ok(())
}

fn is_sibling_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}
