//! `mirror init --database <id>`

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use mirror_core::{config, ChangeIndex};
use mirror_sync::GitCli;

/// Prepare a repository for mirroring a database.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Notion database id (with or without dashes).
    #[arg(long, short = 'd', env = "NOTION_DATABASE_ID")]
    pub database: String,
}

impl InitArgs {
    pub fn run(self, repo: &Path) -> Result<()> {
        fs::create_dir_all(repo)
            .with_context(|| format!("cannot create '{}'", repo.display()))?;
        let root = repo
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", repo.display()))?;

        let had_git = GitCli::is_repo(&root);
        GitCli::init(&root)
            .with_context(|| format!("git init failed in '{}'", root.display()))?;

        let existing = config::config_path(&root).exists();
        let cfg = config::init_at(&root, &self.database)
            .with_context(|| format!("failed to initialise '{}'", root.display()))?;
        let index_path = config::index_path(&root);
        ChangeIndex::open(&index_path)
            .with_context(|| format!("failed to create index '{}'", index_path.display()))?;

        if existing {
            println!(
                "✓ Already initialised for database {} (config left unchanged)",
                cfg.database_id
            );
        } else {
            println!("✓ Initialised mirror of database {}", cfg.database_id);
        }
        if !had_git {
            println!("  Created git repository in {}", root.display());
        }
        println!("  Pages:  {}", cfg.pages_root(&root).display());
        println!("  Config: {}", config::config_path(&root).display());
        Ok(())
    }
}
