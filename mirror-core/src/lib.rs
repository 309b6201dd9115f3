//! Mirror core library: domain types, the ChangeIndex, configuration, errors.
//!
//! - [`types`]: page records, sync log entries, remote listing/content
//! - [`index`]: [`ChangeIndex`], the SQLite store of page metadata
//! - [`config`]: `<repo>/.mirror/` layout and [`MirrorConfig`]
//! - [`error`]: [`IndexError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod index;
pub mod types;

pub use config::MirrorConfig;
pub use error::{ConfigError, IndexError};
pub use index::ChangeIndex;
pub use types::{
    Direction, Outcome, PageId, PageRecord, PageStatus, RemoteContent, RemoteListing,
    SyncLogEntry,
};
