//! `debsync update`: one synchronization pass.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use debsync_sync::{
    plan_archive, state_store::rel_key, update_archive, LocalHierarchy, Outcome, OutcomeRecord,
    PackagePlan, RepreproTool, Status, Step,
};

use super::resolve_archive;

/// What to do after an outcome that is not `ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnFailure {
    /// Keep going with the remaining units.
    Continue,
    /// Stop issuing registrations.
    Stop,
}

/// Arguments for `debsync update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Archive root (defaults to the working directory).
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Show what would be registered without refreshing or running the tool.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit one JSON record per line.
    #[arg(long)]
    pub json: bool,

    /// Continue or stop after a failed or rejected artifact.
    #[arg(long, value_enum, default_value_t = OnFailure::Continue)]
    pub on_failure: OnFailure,
}

impl UpdateArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_archive(self.archive.as_deref())?;
        let mut hierarchy = LocalHierarchy::open(&root)
            .with_context(|| format!("cannot open archive at '{}'", root.display()))?;
        let config = hierarchy.config().clone();

        if self.dry_run {
            let plans = plan_archive(&mut hierarchy, &config).context("dry run failed")?;
            return print_plans(&root, &plans, self.json);
        }

        let mut tool = RepreproTool::new(&root, &config.tool);
        let on_failure = self.on_failure;
        let json = self.json;
        let report = update_archive(&mut hierarchy, &config, &mut tool, |outcome| {
            if !json {
                print_outcome_line(&root, outcome);
            }
            if on_failure == OnFailure::Stop && !outcome.is_ok() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .context("update failed")?;

        if json {
            for outcome in &report.outcomes {
                let line = serde_json::to_string(&outcome.record(&root))
                    .context("failed to serialize outcome")?;
                println!("{line}");
            }
        } else {
            print_summary(&report.outcomes, report.stopped);
        }

        let failed = report.outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            bail!(
                "{failed} of {} outcome(s) were not ok",
                report.outcomes.len()
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_outcome_line(root: &Path, outcome: &Outcome) {
    let record: OutcomeRecord = outcome.record(root);
    let target = record.artifact.as_deref().unwrap_or(record.path.as_str());
    let status = status_label(record.status);
    match record.message {
        Some(message) => println!("  {status}  {}  {target}: {message}", record.action),
        None => println!("  {status}  {}  {target}", record.action),
    }
}

fn print_summary(outcomes: &[Outcome], stopped: bool) {
    if outcomes.is_empty() {
        println!("✓ Archive is up to date");
        return;
    }
    let count = |status: Status| outcomes.iter().filter(|o| o.status() == status).count();
    println!(
        "{} registered, {} failed, {} rejected{}",
        count(Status::Ok),
        count(Status::Error),
        count(Status::Impossible),
        if stopped { " (stopped early)" } else { "" }
    );
}

fn status_label(status: Status) -> String {
    match status {
        Status::Ok => "ok".green().bold().to_string(),
        Status::Error => "error".red().bold().to_string(),
        Status::Impossible => "impossible".yellow().bold().to_string(),
    }
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "codename")]
    codename: String,
    #[tabled(rename = "artifact")]
    artifact: String,
    #[tabled(rename = "inputs")]
    inputs: usize,
}

#[derive(Serialize)]
struct PlannedJson {
    status: String,
    action: &'static str,
    codename: Option<String>,
    artifact: String,
    inputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn plan_rows(root: &Path, plans: &[PackagePlan]) -> Vec<PlannedJson> {
    plans
        .iter()
        .flat_map(|plan| plan.steps.iter())
        .map(|step| match step {
            Step::Register(p) => PlannedJson {
                status: "planned".to_string(),
                action: p.kind.action(),
                codename: Some(p.codename.to_string()),
                artifact: rel_key(root, &p.artifact),
                inputs: p.inputs.iter().map(|i| rel_key(root, i)).collect(),
                message: None,
            },
            Step::Settled(outcome) => {
                let record = outcome.record(root);
                PlannedJson {
                    status: record.status.to_string(),
                    action: outcome.action(),
                    codename: None,
                    artifact: record.artifact.unwrap_or(record.path),
                    inputs: Vec::new(),
                    message: record.message,
                }
            }
        })
        .collect()
}

fn print_plans(root: &Path, plans: &[PackagePlan], json: bool) -> Result<()> {
    let rows = plan_rows(root, plans);
    if json {
        for row in &rows {
            println!(
                "{}",
                serde_json::to_string(row).context("failed to serialize plan")?
            );
        }
        return Ok(());
    }

    if rows.is_empty() {
        println!("[dry-run] ✓ nothing to register");
        return Ok(());
    }
    let table_rows: Vec<PlanRow> = rows
        .into_iter()
        .map(|row| PlanRow {
            action: match row.message {
                Some(message) => format!("{} ({}: {message})", row.action, row.status),
                None => row.action.to_string(),
            },
            codename: row.codename.unwrap_or_else(|| "-".to_string()),
            artifact: row.artifact,
            inputs: row.inputs.len(),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("[dry-run] {} package(s) with pending artifacts", plans.len());
    println!("{table}");
    Ok(())
}
