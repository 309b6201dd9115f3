//! `mirror show <id>`

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use mirror_core::{PageId, PageRecord};
use mirror_sync::page_file;

use super::Workspace;

/// Arguments for `mirror show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Page id, or an unambiguous prefix of it (dashes optional).
    pub id: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ShowJson {
    #[serde(flatten)]
    record: PageRecord,
    path: String,
    /// `None` when the file is missing from the working tree.
    body: Option<String>,
}

impl ShowArgs {
    pub fn run(self, repo: &Path) -> Result<()> {
        let ws = Workspace::open(repo)?;
        let record = find_record(&ws, &self.id)?;

        let rel = page_file::page_path(&ws.config.pages_dir, &record.id, &record.title);
        let body = match fs::read_to_string(ws.root.join(&rel)) {
            Ok(text) => Some(page_file::parse(&text).body),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err).with_context(|| format!("cannot read '{}'", rel.display()))
            }
        };

        if self.json {
            let payload = ShowJson {
                record,
                path: rel.display().to_string(),
                body,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize page JSON")?
            );
            return Ok(());
        }

        println!("{}", record.title.bold());
        println!("{}", "─".repeat(60).bright_black());
        println!("id:           {}", record.id);
        if let Some(parent) = &record.parent_id {
            println!("parent:       {parent}");
        }
        println!("status:       {}", record.status);
        println!("edited:       {}", record.remote_edited_at.to_rfc3339());
        println!("last synced:  {}", record.last_synced_at.to_rfc3339());
        println!("hash:         {}", &record.content_hash[..record.content_hash.len().min(12)]);
        println!("file:         {}", rel.display());
        println!("{}", "─".repeat(60).bright_black());
        match body {
            Some(body) => print!("{body}"),
            None => println!("{}", "(file missing; the next sync restores it)".yellow()),
        }
        Ok(())
    }
}

/// Exact id first, then a unique prefix match ignoring dashes.
fn find_record(ws: &Workspace, query: &str) -> Result<PageRecord> {
    if let Some(record) = ws
        .index
        .get(&PageId::from(query))
        .context("failed to read index")?
    {
        return Ok(record);
    }

    let wanted: String = query.chars().filter(|c| *c != '-').collect();
    if wanted.is_empty() {
        bail!("page id must not be empty");
    }
    let mut matches: Vec<PageRecord> = ws
        .index
        .list_all()
        .context("failed to read index")?
        .into_iter()
        .filter(|r| {
            r.id.as_str()
                .chars()
                .filter(|c| *c != '-')
                .collect::<String>()
                .starts_with(&wanted)
        })
        .collect();
    match matches.len() {
        0 => bail!("no page with id '{query}'"),
        1 => Ok(matches.remove(0)),
        n => bail!("'{query}' matches {n} pages; give more of the id"),
    }
}
