//! [`VersionControl`] backed by the `git` executable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::vcs::{CommitId, VcsError, VersionControl};

/// Summary of the most recent sync commit on the current branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCommit {
    pub id: CommitId,
    pub committed_at: DateTime<Utc>,
    /// Page count parsed from the `| N pages |` part of the message.
    pub pages: usize,
    pub subject: String,
}

/// Git working tree rooted at `repo`.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Whether `path` is inside a git working tree.
    pub fn is_repo(path: &Path) -> bool {
        Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(path)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// `git init` at `path` unless it is already a repository.
    pub fn init(path: &Path) -> Result<Self, VcsError> {
        let git = Self::new(path);
        if !Self::is_repo(path) {
            git.checked(&["init", "--quiet"])?;
            tracing::info!(repo = %path.display(), "initialised git repository");
        }
        Ok(git)
    }

    pub fn current_branch(&self) -> Result<String, VcsError> {
        self.checked(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Most recent commit whose subject starts with `prefix`, if any.
    pub fn last_sync_commit(&self, prefix: &str) -> Result<Option<SyncCommit>, VcsError> {
        let grep = format!("--grep=^{prefix} ");
        let output = self.run(&["log", "-1", &grep, "--format=%H|%cI|%s"])?;
        if !output.status.success() {
            // Fresh repository without any commit yet.
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let mut parts = line.splitn(3, '|');
        let (Some(hash), Some(date), Some(subject)) = (parts.next(), parts.next(), parts.next())
        else {
            return Ok(None);
        };
        let committed_at = DateTime::parse_from_rfc3339(date)
            .map_err(|e| VcsError::Command {
                command: "git log".into(),
                detail: format!("unparseable commit date '{date}': {e}"),
            })?
            .with_timezone(&Utc);
        Ok(Some(SyncCommit {
            id: CommitId(hash.to_string()),
            committed_at,
            pages: pages_in_subject(subject),
            subject: subject.to_string(),
        }))
    }

    fn run(&self, args: &[&str]) -> Result<Output, VcsError> {
        tracing::debug!(args = ?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .map_err(|e| VcsError::Command {
                command: format!("git {}", args.first().copied().unwrap_or_default()),
                detail: e.to_string(),
            })
    }

    /// Run and require success; returns trimmed stdout.
    fn checked(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(VcsError::Command {
                command: format!("git {}", args.first().copied().unwrap_or_default()),
                detail: failure_text(&output),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn is_tracked(&self, path: &str) -> Result<bool, VcsError> {
        let output = self.run(&["ls-files", "--error-unmatch", "--", path])?;
        Ok(output.status.success())
    }

    fn has_remote(&self) -> Result<bool, VcsError> {
        Ok(!self.checked(&["remote"])?.is_empty())
    }
}

impl VersionControl for GitCli {
    fn stage_and_commit(
        &self,
        paths: &BTreeSet<PathBuf>,
        message: &str,
    ) -> Result<CommitId, VcsError> {
        let mut pathspecs = Vec::with_capacity(paths.len());
        for path in paths {
            let spec = path.to_string_lossy().into_owned();
            // Removing a file git never saw leaves nothing to stage.
            if self.repo.join(path).exists() || self.is_tracked(&spec)? {
                pathspecs.push(spec);
            }
        }
        if pathspecs.is_empty() {
            return Err(VcsError::NothingToCommit);
        }

        let with_paths = |head: &[&str]| -> Vec<String> {
            head.iter()
                .map(|s| s.to_string())
                .chain(std::iter::once("--".to_string()))
                .chain(pathspecs.iter().cloned())
                .collect()
        };
        fn as_refs(v: &[String]) -> Vec<&str> {
            v.iter().map(String::as_str).collect()
        }

        let add = with_paths(&["add", "-A"]);
        let output = self.run(&as_refs(&add))?;
        if !output.status.success() {
            return Err(VcsError::CommitFailed(failure_text(&output)));
        }

        let diff = with_paths(&["diff", "--cached", "--quiet"]);
        let output = self.run(&as_refs(&diff))?;
        match output.status.code() {
            Some(0) => return Err(VcsError::NothingToCommit),
            Some(1) => {}
            _ => return Err(VcsError::CommitFailed(failure_text(&output))),
        }

        let commit = with_paths(&["commit", "--quiet", "-m", message]);
        let output = self.run(&as_refs(&commit))?;
        if !output.status.success() {
            return Err(VcsError::CommitFailed(failure_text(&output)));
        }

        let head = self
            .checked(&["rev-parse", "HEAD"])
            .map_err(|e| VcsError::CommitFailed(e.to_string()))?;
        Ok(CommitId(head))
    }

    fn push(&self) -> Result<(), VcsError> {
        if !self.has_remote()? {
            tracing::info!("no git remote configured, not pushing");
            return Ok(());
        }
        let output = self.run(&["push", "--quiet"])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(VcsError::PushFailed(failure_text(&output)))
        }
    }
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let text = if stderr.is_empty() { stdout } else { stderr };
    format!("status {}: {}", output.status, text)
}

fn pages_in_subject(subject: &str) -> usize {
    subject
        .split('|')
        .map(str::trim)
        .find_map(|part| part.strip_suffix(" pages").and_then(|n| n.trim().parse().ok()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_is_read_from_subject() {
        assert_eq!(pages_in_subject("Sync 2024-01-01T00:00:00Z | 12 pages | pull"), 12);
        assert_eq!(pages_in_subject("Sync something else"), 0);
    }
}
