//! `debsync status`: watermark, distributions and pending work.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use debsync_core::ArchiveConfig;
use debsync_sync::{plan_archive, state_store, watermark, LocalHierarchy, PackagePlan, Status, Step};

use super::resolve_archive;

/// Arguments for `debsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Archive root (defaults to the working directory).
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_archive(self.archive.as_deref())?;
        let mut hierarchy = LocalHierarchy::open(&root)
            .with_context(|| format!("cannot open archive at '{}'", root.display()))?;
        let config = hierarchy.config().clone();

        let report = build_report(&root, &mut hierarchy, &config)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_report(&report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WatermarkJson {
    id: String,
    message: String,
    recorded_at: DateTime<Utc>,
    age: String,
}

#[derive(Debug, Serialize)]
struct DistributionJson {
    name: String,
    codename: String,
    upstream: String,
    present: bool,
    pending: usize,
}

#[derive(Debug, Serialize)]
struct PendingJson {
    register: usize,
    rejected: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    archive: String,
    watermark: Option<WatermarkJson>,
    distributions: Vec<DistributionJson>,
    pending: PendingJson,
}

#[derive(Tabled)]
struct DistributionRow {
    #[tabled(rename = "distribution")]
    name: String,
    #[tabled(rename = "codename")]
    codename: String,
    #[tabled(rename = "present")]
    present: String,
    #[tabled(rename = "pending")]
    pending: usize,
    #[tabled(rename = "upstream")]
    upstream: String,
}

fn build_report(
    root: &Path,
    hierarchy: &mut LocalHierarchy,
    config: &ArchiveConfig,
) -> Result<StatusReport> {
    let watermark = match watermark::current(&*hierarchy, config).context("cannot read watermark")? {
        Some(id) => {
            let record = state_store::load_at(root, &id)
                .with_context(|| format!("cannot load archive state {}", id.short()))?;
            Some(WatermarkJson {
                id: id.0.clone(),
                message: record.message,
                age: watermark::format_age(record.recorded_at),
                recorded_at: record.recorded_at,
            })
        }
        None => None,
    };

    let plans = plan_archive(hierarchy, config).context("cannot compute pending work")?;
    let pending = count_pending(&plans);

    let distributions = config
        .distributions
        .iter()
        .map(|entry| {
            let path = root.join(config.distribution_path(&entry.name));
            DistributionJson {
                name: entry.name.to_string(),
                codename: entry.name.codename().to_string(),
                upstream: entry.upstream.display().to_string(),
                present: path.is_dir(),
                pending: plans
                    .iter()
                    .filter(|p| p.distribution.name == entry.name)
                    .flat_map(|p| p.steps.iter())
                    .count(),
            }
        })
        .collect();

    Ok(StatusReport {
        archive: root.display().to_string(),
        watermark,
        distributions,
        pending,
    })
}

fn count_pending(plans: &[PackagePlan]) -> PendingJson {
    let mut pending = PendingJson {
        register: 0,
        rejected: 0,
        failed: 0,
    };
    for step in plans.iter().flat_map(|p| p.steps.iter()) {
        match step {
            Step::Register(_) => pending.register += 1,
            Step::Settled(outcome) if outcome.status() == Status::Impossible => {
                pending.rejected += 1
            }
            Step::Settled(_) => pending.failed += 1,
        }
    }
    pending
}

fn print_report(report: &StatusReport) {
    println!(
        "debsync v{} | {} | {} distributions",
        env!("CARGO_PKG_VERSION"),
        report.archive,
        report.distributions.len(),
    );

    match &report.watermark {
        Some(w) => println!(
            "Watermark: {} ({} ago) {}",
            w.id.get(..12).unwrap_or(&w.id).bold(),
            w.age,
            w.message.bright_black()
        ),
        None => println!("Watermark: {}", "never published".yellow()),
    }

    if report.distributions.is_empty() {
        println!("No distributions tracked.");
        println!("Run: debsync distribution add <NAME> --upstream <PATH>");
        return;
    }

    let rows: Vec<DistributionRow> = report
        .distributions
        .iter()
        .map(|d| DistributionRow {
            name: d.name.clone(),
            codename: d.codename.clone(),
            present: if d.present { "yes" } else { "no" }.to_string(),
            pending: d.pending,
            upstream: d.upstream.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let p = &report.pending;
    if p.register + p.rejected + p.failed == 0 {
        println!("{}", "✓ No pending artifacts in local distributions".green());
    } else {
        println!(
            "Pending: {} to register, {} rejected, {} failed",
            p.register, p.rejected, p.failed
        );
        println!("Run 'debsync update' to refresh distributions and register new artifacts.");
    }
}
