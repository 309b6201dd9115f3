//! Markdown page file format.
//!
//! ```text
//! ---
//! id: 72d9345f-c671-480c-b9b7-2d4bd22baf74
//! title: Meeting notes
//! remote_edited_at: 2024-05-01T10:00:00Z
//! ---
//!
//! <body>
//! ```
//!
//! Only the body takes part in change detection; the frontmatter is
//! regenerated on every write.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mirror_core::PageId;

use crate::hash::{canonicalize, content_hash};

const DELIMITER: &str = "---";
const MAX_SLUG_LEN: usize = 50;

/// Metadata block written at the top of every page file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub id: PageId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PageId>,
    pub remote_edited_at: DateTime<Utc>,
}

/// A page file split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    /// `None` when the file has no frontmatter or it does not parse.
    pub front: Option<FrontMatter>,
    pub body: String,
}

impl ParsedPage {
    pub fn hash(&self) -> String {
        content_hash(&self.body)
    }
}

/// File-name-safe form of a title: alphanumerics, space, `-` and `_` only.
pub fn slug(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let truncated: String = kept.trim().chars().take(MAX_SLUG_LEN).collect();
    let truncated = truncated.trim();
    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated.to_string()
    }
}

/// Repository-relative path of a page file.
///
/// `<pages_dir>/<slug(title)>_<first 8 id chars>.md`
pub fn page_path(pages_dir: &Path, id: &PageId, title: &str) -> PathBuf {
    pages_dir.join(format!("{}_{}.md", slug(title), id.short()))
}

/// Render a page file.
pub fn render(front: &FrontMatter, body: &str) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(front)?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{}", canonicalize(body)))
}

/// Split a page file into frontmatter and body.
///
/// Files without a leading `---` line are all body.
pub fn parse(text: &str) -> ParsedPage {
    let text_lf;
    let text = if text.contains("\r\n") {
        text_lf = text.replace("\r\n", "\n");
        text_lf.as_str()
    } else {
        text
    };

    let Some(rest) = text.strip_prefix("---\n") else {
        return ParsedPage {
            front: None,
            body: text.to_string(),
        };
    };

    let (yaml, after) = if let Some(after) = rest.strip_prefix("---\n") {
        ("", after)
    } else if let Some(end) = rest.find("\n---\n") {
        (&rest[..end + 1], &rest[end + 5..])
    } else if let Some(yaml) = rest.strip_suffix("\n---") {
        (yaml, "")
    } else {
        return ParsedPage {
            front: None,
            body: text.to_string(),
        };
    };

    let body = after.strip_prefix('\n').unwrap_or(after);
    ParsedPage {
        front: serde_yaml::from_str(yaml).ok(),
        body: body.to_string(),
    }
}
