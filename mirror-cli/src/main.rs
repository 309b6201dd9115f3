//! Mirror: keep a Notion database, a local index and a git tree in step.
//!
//! # Usage
//!
//! ```text
//! mirror init --database <id>
//! mirror sync [--no-push] [--dry-run] [--json]
//! mirror status [--json]
//! mirror search <query> [--json]
//! mirror show <id> [--json]
//! ```
//!
//! Every command accepts `--repo <path>` (or `MIRROR_REPO`) and `--verbose`.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    init::InitArgs, search::SearchArgs, show::ShowArgs, status::StatusArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirror",
    version,
    about = "Mirror a Notion database into a git-versioned markdown tree",
    long_about = None,
)]
struct Cli {
    /// Repository root holding `.mirror/` and the page files.
    #[arg(long, global = true, env = "MIRROR_REPO", default_value = ".")]
    repo: PathBuf,

    /// Log debug events to stderr (overrides RUST_LOG).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare a repository for mirroring a database.
    Init(InitArgs),

    /// Run one reconciliation pass.
    Sync(SyncArgs),

    /// Show page counts and the latest pass.
    Status(StatusArgs),

    /// Find pages by title.
    Search(SearchArgs),

    /// Print one page's record and file content.
    Show(ShowArgs),
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Events go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let repo = cli.repo;
    match cli.command {
        Commands::Init(args) => args.run(&repo),
        Commands::Sync(args) => args.run(&repo),
        Commands::Status(args) => args.run(&repo),
        Commands::Search(args) => args.run(&repo),
        Commands::Show(args) => args.run(&repo),
    }
}
