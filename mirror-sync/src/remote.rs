//! Document-service collaborator contract.

use chrono::{DateTime, Utc};
use thiserror::Error;

use mirror_core::{PageId, RemoteContent, RemoteListing};

/// Failures a document service may report.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("page {0} not found")]
    NotFound(PageId),

    /// The service rejected a write because the page changed underneath it.
    #[error("write conflict on page {0}")]
    Conflict(PageId),

    /// Network or server trouble; the caller may retry later.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("access token unavailable: {0}")]
    TokenUnavailable(String),
}

/// Remote store of hierarchical pages.
///
/// Implementations must be shareable across threads: content fetches of one
/// pass may run concurrently.
pub trait DocumentService: Send + Sync {
    /// Cheap metadata-only listing of every page.
    fn list_pages(&self) -> Result<Vec<RemoteListing>, RemoteError>;

    /// Full content of one page.
    fn fetch_content(&self, id: &PageId) -> Result<RemoteContent, RemoteError>;

    /// Replace a page's content; returns the new remote edit time.
    fn write_content(&self, id: &PageId, content: &str) -> Result<DateTime<Utc>, RemoteError>;
}
