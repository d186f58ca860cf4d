//! `debsync distribution add <NAME> --upstream <PATH>` and
//! `debsync distribution list`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use debsync_core::{config, DistributionName};

use super::resolve_archive;

/// Manage the distributions tracked by the archive.
#[derive(Subcommand, Debug)]
pub enum DistributionCommand {
    /// Track a distribution mirrored from an upstream directory.
    Add(AddArgs),

    /// List tracked distributions.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Distribution name, `<codename>` or `<codename>-<flavor>`.
    pub name: String,

    /// Directory the distribution is reset from on every update.
    #[arg(long)]
    pub upstream: PathBuf,

    /// Archive root (defaults to the working directory).
    #[arg(long)]
    pub archive: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Archive root (defaults to the working directory).
    #[arg(long)]
    pub archive: Option<PathBuf>,
}

#[derive(Tabled)]
struct DistributionRow {
    #[tabled(rename = "distribution")]
    name: String,
    #[tabled(rename = "codename")]
    codename: String,
    #[tabled(rename = "upstream")]
    upstream: String,
}

pub fn run(cmd: DistributionCommand) -> Result<()> {
    match cmd {
        DistributionCommand::Add(args) => add(args),
        DistributionCommand::List(args) => list(args),
    }
}

fn add(args: AddArgs) -> Result<()> {
    let root = resolve_archive(args.archive.as_deref())?;
    let upstream = if args.upstream.is_absolute() {
        args.upstream.clone()
    } else {
        std::env::current_dir()
            .context("cannot determine working directory")?
            .join(&args.upstream)
    };

    let name = DistributionName::from(args.name.clone());
    let codename = name.codename();
    config::add_distribution_at(&root, name, upstream.clone())
        .with_context(|| format!("failed to add distribution '{}'", args.name))?;

    println!(
        "✓ Tracking '{}' (codename {}) from {}",
        args.name,
        codename,
        upstream.display()
    );
    Ok(())
}

fn list(args: ListArgs) -> Result<()> {
    let root = resolve_archive(args.archive.as_deref())?;
    let cfg = config::load_at(&root).context("failed to load archive config")?;

    if cfg.distributions.is_empty() {
        println!("No distributions tracked.");
        println!("Run: debsync distribution add <NAME> --upstream <PATH>");
        return Ok(());
    }

    let rows: Vec<DistributionRow> = cfg
        .distributions
        .iter()
        .map(|d| DistributionRow {
            name: d.name.to_string(),
            codename: d.name.codename().to_string(),
            upstream: d.upstream.display().to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
