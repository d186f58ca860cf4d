//! Field access for `.changes` and `.dsc` descriptors.
//!
//! Parsing is done by `deb822-lossless`; an OpenPGP clear-signed wrapper is
//! removed with its `pgp` helper first. Only the first paragraph is read.

use std::str::FromStr;

use deb822_lossless::{pgp, Deb822};
use thiserror::Error;

const PGP_MESSAGE: &str = "-----BEGIN PGP SIGNED MESSAGE-----";

/// Errors from reading a descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor has no fields")]
    Empty,

    #[error("bad signature wrapper: {reason}")]
    Signature { reason: String },

    #[error("malformed descriptor: {reason}")]
    Malformed { reason: String },

    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
}

/// The fields of a descriptor the classifier looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    source: Option<String>,
    version: Option<String>,
    distribution: Option<String>,
    files: Option<String>,
}

impl Descriptor {
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let body = if text.trim_start().starts_with(PGP_MESSAGE) {
            let (body, _signature) =
                pgp::strip_pgp_signature(text).map_err(|e| DescriptorError::Signature {
                    reason: e.to_string(),
                })?;
            body
        } else {
            text.to_string()
        };

        let deb822 = Deb822::from_str(&body).map_err(|e| DescriptorError::Malformed {
            reason: e.to_string(),
        })?;
        let paragraph = deb822.paragraphs().next().ok_or(DescriptorError::Empty)?;

        Ok(Self {
            source: paragraph.get("Source"),
            version: paragraph.get("Version"),
            distribution: paragraph.get("Distribution"),
            files: paragraph.get("Files"),
        })
    }

    fn required<'a>(
        value: &'a Option<String>,
        field: &'static str,
    ) -> Result<&'a str, DescriptorError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(DescriptorError::MissingField { field })
    }

    /// Source package name, without a `(version)` suffix.
    pub fn source(&self) -> Result<&str, DescriptorError> {
        Self::required(&self.source, "Source")?
            .split_whitespace()
            .next()
            .ok_or(DescriptorError::MissingField { field: "Source" })
    }

    pub fn version(&self) -> Result<&str, DescriptorError> {
        Self::required(&self.version, "Version")
    }

    /// Whitespace-separated entries of the `Distribution` field.
    pub fn distributions(&self) -> Vec<&str> {
        self.distribution
            .as_deref()
            .map(|d| d.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Filenames listed in the `Files` field, in order.
    pub fn files(&self) -> Result<Vec<String>, DescriptorError> {
        let raw = Self::required(&self.files, "Files")?;
        Ok(raw
            .lines()
            .filter_map(|l| l.split_whitespace().last())
            .map(str::to_string)
            .collect())
    }
}

/// Version with any `epoch:` prefix removed, as used in filenames.
pub fn strip_epoch(version: &str) -> &str {
    match version.split_once(':') {
        Some((epoch, rest)) if epoch.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => version,
    }
}
