//! `mirror sync [--no-push] [--dry-run] [--json]`

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use mirror_notion::{NotionClient, TokenChain};
use mirror_sync::{
    DiskPageStore, GitCli, PassOptions, PassOutcome, PassSummary, Plan, Reconciler,
};

use super::Workspace;

/// Arguments for `mirror sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Do not `git push` the sync commit, whatever the config says.
    #[arg(long)]
    pub no_push: bool,

    /// Classify pages and print the plan without fetching, writing or committing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Notion API root (for proxies).
    #[arg(long, env = "NOTION_API_URL", hide = true)]
    pub api_url: Option<String>,
}

impl SyncArgs {
    pub fn run(self, repo: &Path) -> Result<()> {
        let Workspace {
            root,
            config,
            mut index,
        } = Workspace::open(repo)?;

        let mut client = NotionClient::from_provider(&config.database_id, &TokenChain::default())
            .context("cannot authenticate with Notion")?;
        if let Some(url) = &self.api_url {
            client = client.with_base_url(url.as_str());
        }
        let vcs = GitCli::new(&root);
        let pages = DiskPageStore::new(&root);
        let options = PassOptions {
            dry_run: self.dry_run,
            push_remote: config.push_remote && !self.no_push,
        };
        tracing::debug!(
            repo = %root.display(),
            dry_run = options.dry_run,
            push = options.push_remote,
            "starting sync"
        );

        let outcome = Reconciler::new(&root, &config, &mut index, &client, &vcs, &pages)
            .with_options(options)
            .run()
            .context("sync failed")?;

        match outcome {
            PassOutcome::Skipped => print_skipped(self.json),
            PassOutcome::Planned(plan) => print_plan(&plan, self.json),
            PassOutcome::Completed(summary) => print_summary(&summary, self.json),
        }
    }
}

#[derive(Serialize)]
struct SkippedJson {
    outcome: &'static str,
}

#[derive(Serialize)]
struct PlanJson {
    dry_run: bool,
    counts: BTreeMap<&'static str, usize>,
    pages: Vec<PlanPageJson>,
}

#[derive(Serialize)]
struct PlanPageJson {
    id: String,
    title: Option<String>,
    classification: &'static str,
    fetch: bool,
}

#[derive(Tabled)]
struct PlanTableRow {
    #[tabled(rename = "page")]
    page: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "classification")]
    classification: String,
    #[tabled(rename = "fetch")]
    fetch: String,
}

fn print_skipped(json: bool) -> Result<()> {
    if json {
        let payload = SkippedJson { outcome: "skipped" };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize sync JSON")?
        );
    } else {
        println!("· Another sync pass is running; skipped");
    }
    Ok(())
}

fn print_plan(plan: &Plan, json: bool) -> Result<()> {
    if json {
        let payload = PlanJson {
            dry_run: true,
            counts: plan
                .counts()
                .into_iter()
                .map(|(classification, n)| (classification.as_str(), n))
                .collect(),
            pages: plan
                .pages
                .iter()
                .map(|page| PlanPageJson {
                    id: page.id().to_string(),
                    title: page.record().map(|r| r.title.clone()),
                    classification: page.classification().as_str(),
                    fetch: page.needs_fetch(),
                })
                .collect(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize plan JSON")?
        );
        return Ok(());
    }

    if plan.is_noop() {
        println!(
            "[dry-run] ✓ nothing to do ({} pages unchanged)",
            plan.pages.len()
        );
        return Ok(());
    }

    let counts = plan
        .counts()
        .into_iter()
        .map(|(classification, n)| format!("{n} {classification}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "[dry-run] {} pages | {} to fetch | {counts}",
        plan.pages.len(),
        plan.fetch_ids().len()
    );
    let rows: Vec<PlanTableRow> = plan
        .pages
        .iter()
        .filter(|page| page.classification() != mirror_sync::Classification::Unchanged)
        .map(|page| PlanTableRow {
            page: page.id().short(),
            title: page
                .record()
                .map_or_else(|| "(not fetched)".to_string(), |r| r.title.clone()),
            classification: page.classification().to_string(),
            fetch: if page.needs_fetch() { "yes" } else { "" }.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn print_summary(summary: &PassSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("failed to serialize sync JSON")?
        );
        return Ok(());
    }

    let indicator = match summary.outcome {
        mirror_core::Outcome::Success => "✓".green().bold(),
        mirror_core::Outcome::Partial => "!".yellow().bold(),
        mirror_core::Outcome::Failed => "✗".red().bold(),
    };
    println!(
        "{indicator} {} | {} pages | {}",
        summary.direction,
        summary.pages_touched(),
        summary.message
    );
    if let Some(commit) = &summary.commit {
        println!("  commit {}", commit.short());
    }
    for (marker, ids) in [
        ("↓", &summary.pulled),
        ("↑", &summary.pushed),
        ("✕", &summary.deleted),
    ] {
        for id in ids {
            println!("  {marker}  {id}");
        }
    }
    for id in &summary.conflicts {
        println!(
            "  {}  {id} edited on both sides; kept the Notion copy",
            "⚠".yellow()
        );
    }
    Ok(())
}
