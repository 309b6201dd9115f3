//! `mirror status`: page counts and the latest pass.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use mirror_core::{config, Outcome, PageStatus, SyncLogEntry};
use mirror_sync::{GitCli, RunLock, SyncCommit};

use super::{format_age, Workspace};

/// Arguments for `mirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, repo: &Path) -> Result<()> {
        let ws = Workspace::open(repo)?;
        let report = build_report(&ws)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_report(&report);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReport {
    repo: String,
    database_id: String,
    pages_dir: String,
    push_remote: bool,
    sync_running: bool,
    pages: PageCounts,
    last_run: Option<SyncLogEntry>,
    last_success: Option<String>,
    last_commit: Option<SyncCommit>,
}

#[derive(Serialize, Default)]
struct PageCounts {
    total: usize,
    synced: usize,
    pending_push: usize,
    pending_pull: usize,
    conflict: usize,
    deleted: usize,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "pages")]
    pages: usize,
}

fn build_report(ws: &Workspace) -> Result<StatusReport> {
    let mut pages = PageCounts::default();
    for (status, n) in ws.index.count_by_status().context("failed to count pages")? {
        match status {
            PageStatus::Synced => pages.synced = n,
            PageStatus::PendingPush => pages.pending_push = n,
            PageStatus::PendingPull => pages.pending_pull = n,
            PageStatus::Conflict => pages.conflict = n,
            PageStatus::Deleted => pages.deleted = n,
        }
        pages.total += n;
    }

    let last_run = ws.index.latest_log().context("failed to read sync log")?;
    let last_success = ws
        .index
        .last_successful_sync()
        .context("failed to read sync log")?
        .map(|at| at.to_rfc3339());

    let last_commit = if GitCli::is_repo(&ws.root) {
        GitCli::new(&ws.root)
            .last_sync_commit(&ws.config.commit_prefix)
            .unwrap_or_default()
    } else {
        None
    };

    let sync_running = RunLock::is_held(&config::lock_path(&ws.root)).unwrap_or(false);

    Ok(StatusReport {
        repo: ws.root.display().to_string(),
        database_id: ws.config.database_id.clone(),
        pages_dir: ws.config.pages_dir.display().to_string(),
        push_remote: ws.config.push_remote,
        sync_running,
        pages,
        last_run,
        last_success,
        last_commit,
    })
}

fn print_report(report: &StatusReport) {
    println!(
        "Mirror v{} | database {} | {} pages",
        env!("CARGO_PKG_VERSION"),
        report.database_id,
        report.pages.total - report.pages.deleted,
    );
    let separator = "■".repeat(60).bright_black().to_string();
    println!("{separator}");
    println!("repo:       {}", report.repo);
    println!("pages dir:  {}", report.pages_dir);
    println!(
        "git push:   {}",
        if report.push_remote { "on" } else { "off" }
    );
    if report.sync_running {
        println!("{} a sync pass is running", "■".cyan().bold());
    }
    println!("{separator}");

    let rows = vec![
        CountRow {
            status: PageStatus::Synced.to_string(),
            pages: report.pages.synced,
        },
        CountRow {
            status: PageStatus::PendingPush.to_string(),
            pages: report.pages.pending_push,
        },
        CountRow {
            status: PageStatus::PendingPull.to_string(),
            pages: report.pages.pending_pull,
        },
        CountRow {
            status: PageStatus::Conflict.to_string(),
            pages: report.pages.conflict,
        },
        CountRow {
            status: PageStatus::Deleted.to_string(),
            pages: report.pages.deleted,
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{separator}");

    match &report.last_run {
        None => println!("Last sync: never. Run 'mirror sync' to pull the database."),
        Some(entry) => {
            println!(
                "Last sync: {} {} | {} | {} pages | {}",
                outcome_indicator(entry.outcome),
                format_age(entry.run_at),
                entry.direction,
                entry.pages_touched,
                entry.message
            );
            if entry.outcome != Outcome::Success {
                if let Some(at) = &report.last_success {
                    println!("Last successful sync: {at}");
                }
            }
        }
    }
    if let Some(commit) = &report.last_commit {
        println!(
            "Last sync commit: {} {}",
            commit.id.short().bright_black(),
            commit.subject
        );
    }
}

fn outcome_indicator(outcome: Outcome) -> String {
    match outcome {
        Outcome::Success => "■".green().bold().to_string(),
        Outcome::Partial => "■".yellow().bold().to_string(),
        Outcome::Failed => "■".red().bold().to_string(),
    }
}
