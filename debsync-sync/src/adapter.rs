//! Archive tool adapter.
//!
//! All command-line formatting lives here; the pipeline only hands over a
//! typed [`RegisterRequest`].

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use debsync_core::{ArtifactKind, Codename, ToolConfig};

use crate::state_store::rel_key;

/// One registration handed to the archive tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub kind: ArtifactKind,
    pub codename: Codename,
    /// The triggering artifact (absolute).
    pub artifact: PathBuf,
    /// Every file the tool will read, artifact first (absolute).
    pub inputs: Vec<PathBuf>,
}

/// Failure of a single archive tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("archive tool {}: {stderr}", exit_label(.code))]
    Exit { code: Option<i32>, stderr: String },

    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

/// A command-line tool that registers artifacts into the published archive.
pub trait ArchiveTool {
    /// The full command line (program first) for `request`.
    fn command_line(&self, request: &RegisterRequest) -> Vec<String>;

    /// Run the registration. Declared inputs are present when this is called.
    fn register(&mut self, request: &RegisterRequest) -> Result<(), ToolError>;
}

/// [`ArchiveTool`] backed by `reprepro`, run from the archive root.
#[derive(Debug, Clone)]
pub struct RepreproTool {
    root: PathBuf,
    program: String,
    args: Vec<String>,
}

impl RepreproTool {
    pub fn new(root: &Path, config: &ToolConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn display_path(&self, path: &Path) -> String {
        if path.starts_with(&self.root) {
            rel_key(&self.root, path)
        } else {
            path.display().to_string()
        }
    }
}

impl ArchiveTool for RepreproTool {
    fn command_line(&self, request: &RegisterRequest) -> Vec<String> {
        let mut cmd = Vec::with_capacity(self.args.len() + 5);
        cmd.push(self.program.clone());
        cmd.extend(self.args.iter().cloned());
        let operation = match request.kind {
            ArtifactKind::Manifest => {
                // The codename is forced from the distribution name.
                cmd.push("--ignore=wrongdistribution".to_string());
                "include"
            }
            ArtifactKind::Source => "includedsc",
            ArtifactKind::Binary => "includedeb",
        };
        cmd.push(operation.to_string());
        cmd.push(request.codename.0.clone());
        cmd.push(self.display_path(&request.artifact));
        cmd
    }

    fn register(&mut self, request: &RegisterRequest) -> Result<(), ToolError> {
        let cmd = self.command_line(request);
        tracing::debug!("running: {}", cmd.join(" "));

        let output = Command::new(&cmd[0])
            .args(&cmd[1..])
            .current_dir(&self.root)
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(ToolError::Exit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
