//! # mirror-sync
//!
//! Reconciliation engine between a remote document service, the local
//! [`ChangeIndex`](mirror_core::ChangeIndex) and a version-controlled tree of
//! markdown page files.
//!
//! Build a [`Reconciler`] over the three collaborators ([`DocumentService`],
//! [`VersionControl`], [`PageStore`]) and call [`Reconciler::run`] for one
//! pass. [`planner::plan`] and [`policy::resolve_conflict`] are pure and can
//! be used on their own.

pub mod error;
pub mod git;
pub mod hash;
pub mod lock;
pub mod page_file;
pub mod planner;
pub mod policy;
pub mod remote;
pub mod runner;
pub mod staging;
pub mod store;
pub mod vcs;

pub use error::SyncError;
pub use git::{GitCli, SyncCommit};
pub use lock::RunLock;
pub use planner::{Classification, LocalSnapshot, LocalState, PagePlan, Plan};
pub use policy::{Resolution, WinningSide};
pub use remote::{DocumentService, RemoteError};
pub use runner::{PassOptions, PassOutcome, PassState, PassSummary, Reconciler};
pub use store::{DiskPageStore, PageStore};
pub use vcs::{CommitId, VcsError, VersionControl};
