pub mod distribution;
pub mod init;
pub mod status;
pub mod update;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// The archive root: `--archive` if given, else the working directory.
pub fn resolve_archive(archive: Option<&Path>) -> Result<PathBuf> {
    let path = match archive {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    path.canonicalize()
        .with_context(|| format!("cannot resolve archive path '{}'", path.display()))
}
