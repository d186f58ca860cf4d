//! `debsync init [PATH]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use debsync_core::config;

/// Create the archive layout and default config.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Archive root directory; created if missing.
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        std::fs::create_dir_all(&self.path)
            .with_context(|| format!("cannot create '{}'", self.path.display()))?;
        let root = self
            .path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.path.display()))?;

        let existed = config::config_path_at(&root).exists();
        let cfg = config::init_at(&root)
            .with_context(|| format!("failed to init archive at '{}'", root.display()))?;

        if existed {
            println!("✓ Archive already initialized at {}", root.display());
        } else {
            println!("✓ Initialized archive at {}", root.display());
        }
        println!("  Config:        {}", config::config_path_at(&root).display());
        println!("  Published dir: {}", cfg.published_dir.display());
        println!("  Archive tool:  {}", cfg.tool.program);
        Ok(())
    }
}
