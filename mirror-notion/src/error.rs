//! Error types for mirror-notion.

use thiserror::Error;

use mirror_core::PageId;
use mirror_sync::RemoteError;

#[derive(Debug, Error)]
pub enum NotionError {
    /// The API answered with a non-success status.
    #[error("Notion API returned {status} for {endpoint}: {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// The request never got an answer (DNS, TLS, connection, timeout).
    #[error("request to {endpoint} failed: {detail}")]
    Transport { endpoint: String, detail: String },

    /// The answer was not the JSON shape we expect.
    #[error("unexpected response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },

    #[error("{0}")]
    TokenUnavailable(String),

    /// Replacing the page body would destroy blocks markdown cannot carry.
    #[error("page {page} has blocks that do not survive a markdown round trip ({blocks}); edit it in Notion instead")]
    Unrepresentable { page: String, blocks: String },
}

impl NotionError {
    /// Map onto the document-service contract for an operation on `id`.
    ///
    /// 404 is `NotFound`, 409 is `Conflict`; every other failure is
    /// transient from the engine's point of view.
    pub fn into_remote(self, id: &PageId) -> RemoteError {
        match self {
            NotionError::Status { status: 404, .. } => RemoteError::NotFound(id.clone()),
            NotionError::Status { status: 409, .. } => RemoteError::Conflict(id.clone()),
            NotionError::Unrepresentable { .. } => RemoteError::Conflict(id.clone()),
            NotionError::TokenUnavailable(detail) => RemoteError::TokenUnavailable(detail),
            other => RemoteError::Transient(other.to_string()),
        }
    }
}

impl From<NotionError> for RemoteError {
    fn from(err: NotionError) -> Self {
        match err {
            NotionError::TokenUnavailable(detail) => RemoteError::TokenUnavailable(detail),
            other => RemoteError::Transient(other.to_string()),
        }
    }
}
