//! debsync: incremental package archive synchronization.
//!
//! # Usage
//!
//! ```text
//! debsync init [PATH]
//! debsync distribution add <NAME> --upstream <PATH> [--archive <PATH>]
//! debsync distribution list [--archive <PATH>]
//! debsync update [--archive <PATH>] [--dry-run] [--json] [--on-failure continue|stop]
//! debsync status [--archive <PATH>] [--json]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `warn`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    distribution::DistributionCommand, init::InitArgs, status::StatusArgs, update::UpdateArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "debsync",
    version,
    about = "Keep a Debian package archive in sync with its distribution projects",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the archive layout and default config.
    Init(InitArgs),

    /// Manage the distributions tracked by the archive.
    Distribution {
        #[command(subcommand)]
        command: DistributionCommand,
    },

    /// Refresh distributions and register new artifacts.
    Update(UpdateArgs),

    /// Show the watermark, tracked distributions and pending work.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Distribution { command } => commands::distribution::run(command),
        Commands::Update(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
