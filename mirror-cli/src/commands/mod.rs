pub mod init;
pub mod search;
pub mod show;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use mirror_core::{config, ChangeIndex, MirrorConfig};

/// An initialised repository: absolute root, its config and its index.
pub struct Workspace {
    pub root: PathBuf,
    pub config: MirrorConfig,
    pub index: ChangeIndex,
}

impl Workspace {
    pub fn open(repo: &Path) -> Result<Self> {
        let root = repo
            .canonicalize()
            .with_context(|| format!("cannot resolve repository '{}'", repo.display()))?;
        let config = config::load_at(&root).with_context(|| {
            format!(
                "no mirror configuration in '{}'; run `mirror init --database <id>` first",
                root.display()
            )
        })?;
        let index_path = config::index_path(&root);
        let index = ChangeIndex::open(&index_path)
            .with_context(|| format!("failed to open index '{}'", index_path.display()))?;
        Ok(Self {
            root,
            config,
            index,
        })
    }
}

/// "3m ago", "2h ago", "5d ago".
pub fn format_age(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

/// First non-empty body lines, cut to `max` characters.
pub fn preview(body: &str, max: usize) -> String {
    let joined = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.chars().count() <= max {
        return joined;
    }
    let cut: String = joined.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ages_use_largest_unit() {
        assert_eq!(format_age(Utc::now() - Duration::seconds(5)), "5s ago");
        assert_eq!(format_age(Utc::now() - Duration::minutes(3)), "3m ago");
        assert_eq!(format_age(Utc::now() - Duration::hours(2)), "2h ago");
        assert_eq!(format_age(Utc::now() - Duration::days(9)), "9d ago");
    }

    #[test]
    fn preview_joins_lines_and_truncates() {
        assert_eq!(preview("# Title\n\nfirst line\n", 80), "# Title first line");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
        assert_eq!(preview("", 10), "");
    }
}
