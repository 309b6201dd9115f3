//! Error types for mirror-sync.
//!
//! Lock contention is not an error: a pass that finds the repository busy
//! returns [`crate::PassOutcome::Skipped`].

use std::path::PathBuf;

use thiserror::Error;

use mirror_core::{IndexError, PageId};

use crate::remote::RemoteError;
use crate::vcs::VcsError;

/// All errors that can end a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The document service failed (listing, fetch or write).
    #[error("document service error: {0}")]
    Remote(#[from] RemoteError),

    /// The version-control adapter failed before anything was committed.
    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A page's frontmatter could not be rendered.
    #[error("failed to render page {id}: {source}")]
    Render {
        id: PageId,
        #[source]
        source: serde_yaml::Error,
    },

    /// The ChangeIndex failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// The planner was handed inputs that break the collaborator contract.
    #[error("classification invariant violated for {id}: {detail}")]
    ClassificationInvariantViolation { id: PageId, detail: String },

    /// Failure during or after the commit; needs manual repair.
    #[error("pass failed after commit {commit}: {detail}")]
    PartialCommit { commit: String, detail: String },
}

impl SyncError {
    /// Fatal errors indicate a contract breach or an ambiguous commit and are
    /// never retried automatically.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ClassificationInvariantViolation { .. } | SyncError::PartialCommit { .. }
        )
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
