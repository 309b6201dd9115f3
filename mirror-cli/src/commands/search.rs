//! `mirror search <query>`: title search over the index.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use mirror_core::{PageRecord, PageStatus};
use mirror_sync::page_file;

use super::{format_age, preview, Workspace};

const PREVIEW_CHARS: usize = 60;

/// Arguments for `mirror search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Case-insensitive text to look for in page titles.
    pub query: String,

    /// Include pages deleted in Notion.
    #[arg(long)]
    pub all: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SearchHit {
    #[serde(flatten)]
    record: PageRecord,
    path: String,
    preview: String,
}

#[derive(Tabled)]
struct SearchRow {
    #[tabled(rename = "page")]
    page: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "edited")]
    edited: String,
    #[tabled(rename = "preview")]
    preview: String,
}

impl SearchArgs {
    pub fn run(self, repo: &Path) -> Result<()> {
        let ws = Workspace::open(repo)?;
        let records = ws
            .index
            .search(&self.query)
            .with_context(|| format!("search for '{}' failed", self.query))?;

        let hits: Vec<SearchHit> = records
            .into_iter()
            .filter(|r| self.all || r.status != PageStatus::Deleted)
            .map(|record| {
                let rel = page_file::page_path(&ws.config.pages_dir, &record.id, &record.title);
                let snippet = fs::read_to_string(ws.root.join(&rel))
                    .map(|text| preview(&page_file::parse(&text).body, PREVIEW_CHARS))
                    .unwrap_or_default();
                SearchHit {
                    record,
                    path: rel.display().to_string(),
                    preview: snippet,
                }
            })
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&hits).context("failed to serialize search JSON")?
            );
            return Ok(());
        }

        if hits.is_empty() {
            println!("No pages match '{}'.", self.query);
            return Ok(());
        }
        println!("{} pages match '{}'", hits.len(), self.query);
        let rows: Vec<SearchRow> = hits
            .into_iter()
            .map(|hit| SearchRow {
                page: hit.record.id.short(),
                title: hit.record.title,
                status: hit.record.status.to_string(),
                edited: format_age(hit.record.remote_edited_at),
                preview: hit.preview,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
