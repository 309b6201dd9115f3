//! Version-control collaborator contract.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Identifier of a created commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    /// Abbreviated form for human output.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum VcsError {
    /// The given paths carry no changes. The runner treats this as a no-op.
    #[error("nothing to commit")]
    NothingToCommit,

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("push failed: {0}")]
    PushFailed(String),

    /// Any other adapter command failure.
    #[error("{command} failed: {detail}")]
    Command { command: String, detail: String },
}

/// Stage-and-commit capability over the working tree.
pub trait VersionControl {
    /// Stage exactly `paths` (repository-relative, including removals) and
    /// record them in one commit.
    fn stage_and_commit(
        &self,
        paths: &BTreeSet<PathBuf>,
        message: &str,
    ) -> Result<CommitId, VcsError>;

    /// Publish local commits to the configured remote.
    fn push(&self) -> Result<(), VcsError>;
}
