//! DiffPlanner: decides what each page needs, without touching the network
//! or the disk.
//!
//! Two independent signals feed every decision:
//! - the remote edit time from the listing, against the record's
//!   `last_synced_at`;
//! - the hash of the local file body, against the record's `content_hash`.
//!
//! | remote newer | local changed | classification |
//! |--------------|---------------|----------------|
//! | no           | no            | unchanged      |
//! | yes          | no            | remote-ahead   |
//! | no           | yes           | local-ahead    |
//! | yes          | yes           | conflict       |
//!
//! plus `new` (unknown id, or a deleted record that reappeared),
//! `deleted-remotely` (known id missing from the listing) and `missing`
//! (the local file is gone; re-materialised from the remote).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use mirror_core::{PageId, PageRecord, PageStatus, RemoteListing};

use crate::error::SyncError;

/// State of a page's local file as observed before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    Missing,
    Present { hash: String },
}

/// Local observations keyed by page id. Ids without an entry are treated as
/// [`LocalState::Missing`].
pub type LocalSnapshot = HashMap<PageId, LocalState>;

/// Flat classification label, used for counting and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    New,
    RemoteAhead,
    LocalAhead,
    Conflict,
    Missing,
    DeletedRemotely,
    Unchanged,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::RemoteAhead => "remote-ahead",
            Classification::LocalAhead => "local-ahead",
            Classification::Conflict => "conflict",
            Classification::Missing => "missing",
            Classification::DeletedRemotely => "deleted-remotely",
            Classification::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision for one page. Each variant carries exactly the data its
/// action needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePlan {
    /// Unknown locally (or previously deleted): fetch and materialise.
    New {
        id: PageId,
        remote_edited_at: DateTime<Utc>,
        previous: Option<PageRecord>,
    },
    /// Edited remotely, untouched locally: fetch and overwrite.
    RemoteAhead {
        record: PageRecord,
        remote_edited_at: DateTime<Utc>,
    },
    /// Edited on both sides: fetch; the remote wins.
    Conflict {
        record: PageRecord,
        remote_edited_at: DateTime<Utc>,
        local_hash: String,
    },
    /// Local file vanished: fetch and restore.
    Missing {
        record: PageRecord,
        remote_edited_at: DateTime<Utc>,
    },
    /// Edited locally only: push, no fetch.
    LocalAhead { record: PageRecord, local_hash: String },
    /// Gone from the remote: mark deleted and clean up the file.
    DeletedRemotely { record: PageRecord },
    Unchanged { id: PageId },
}

impl PagePlan {
    pub fn id(&self) -> &PageId {
        match self {
            PagePlan::New { id, .. } | PagePlan::Unchanged { id } => id,
            PagePlan::RemoteAhead { record, .. }
            | PagePlan::Conflict { record, .. }
            | PagePlan::Missing { record, .. }
            | PagePlan::LocalAhead { record, .. }
            | PagePlan::DeletedRemotely { record } => &record.id,
        }
    }

    pub fn classification(&self) -> Classification {
        match self {
            PagePlan::New { .. } => Classification::New,
            PagePlan::RemoteAhead { .. } => Classification::RemoteAhead,
            PagePlan::Conflict { .. } => Classification::Conflict,
            PagePlan::Missing { .. } => Classification::Missing,
            PagePlan::LocalAhead { .. } => Classification::LocalAhead,
            PagePlan::DeletedRemotely { .. } => Classification::DeletedRemotely,
            PagePlan::Unchanged { .. } => Classification::Unchanged,
        }
    }

    /// Whether the full content must be fetched.
    pub fn needs_fetch(&self) -> bool {
        matches!(
            self,
            PagePlan::New { .. }
                | PagePlan::RemoteAhead { .. }
                | PagePlan::Conflict { .. }
                | PagePlan::Missing { .. }
        )
    }

    /// Locally known record this plan started from, if any.
    pub fn record(&self) -> Option<&PageRecord> {
        match self {
            PagePlan::New { previous, .. } => previous.as_ref(),
            PagePlan::RemoteAhead { record, .. }
            | PagePlan::Conflict { record, .. }
            | PagePlan::Missing { record, .. }
            | PagePlan::LocalAhead { record, .. }
            | PagePlan::DeletedRemotely { record } => Some(record),
            PagePlan::Unchanged { .. } => None,
        }
    }
}

/// Ordered (by id) decisions for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub pages: Vec<PagePlan>,
}

impl Plan {
    /// Ids whose full content must be fetched.
    pub fn fetch_ids(&self) -> Vec<PageId> {
        self.pages
            .iter()
            .filter(|p| p.needs_fetch())
            .map(|p| p.id().clone())
            .collect()
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.pages
            .iter()
            .filter(|p| p.classification() == classification)
            .count()
    }

    /// Number of pages per classification (absent when zero).
    pub fn counts(&self) -> BTreeMap<Classification, usize> {
        let mut counts = BTreeMap::new();
        for page in &self.pages {
            *counts.entry(page.classification()).or_insert(0) += 1;
        }
        counts
    }

    /// True when the pass has nothing to do.
    pub fn is_noop(&self) -> bool {
        self.pages
            .iter()
            .all(|p| p.classification() == Classification::Unchanged)
    }

    pub fn get(&self, id: &PageId) -> Option<&PagePlan> {
        self.pages.iter().find(|p| p.id() == id)
    }
}

/// Classify every page seen remotely or locally.
///
/// Fails with [`SyncError::ClassificationInvariantViolation`] when the
/// listing itself breaks the collaborator contract (duplicate or empty ids).
pub fn plan(
    listing: &[RemoteListing],
    records: &[PageRecord],
    local: &LocalSnapshot,
) -> Result<Plan, SyncError> {
    let mut remote: BTreeMap<&PageId, DateTime<Utc>> = BTreeMap::new();
    for entry in listing {
        if entry.id.as_str().trim().is_empty() {
            return Err(SyncError::ClassificationInvariantViolation {
                id: entry.id.clone(),
                detail: "remote listing contains an empty id".into(),
            });
        }
        if remote.insert(&entry.id, entry.remote_edited_at).is_some() {
            return Err(SyncError::ClassificationInvariantViolation {
                id: entry.id.clone(),
                detail: "page listed more than once by the document service".into(),
            });
        }
    }

    let mut known: BTreeMap<&PageId, &PageRecord> = BTreeMap::new();
    for record in records {
        if known.insert(&record.id, record).is_some() {
            return Err(SyncError::ClassificationInvariantViolation {
                id: record.id.clone(),
                detail: "index holds the page more than once".into(),
            });
        }
    }

    let mut pages = BTreeMap::new();
    for (&id, &remote_edited_at) in &remote {
        let decision = match known.get(id) {
            None => PagePlan::New {
                id: id.clone(),
                remote_edited_at,
                previous: None,
            },
            Some(record) if record.status == PageStatus::Deleted => PagePlan::New {
                id: id.clone(),
                remote_edited_at,
                previous: Some((*record).clone()),
            },
            Some(record) => classify_known(record, remote_edited_at, local.get(id)),
        };
        pages.insert(id.clone(), decision);
    }

    for (&id, &record) in &known {
        if remote.contains_key(id) {
            continue;
        }
        let decision = if record.status == PageStatus::Deleted {
            PagePlan::Unchanged { id: id.clone() }
        } else {
            PagePlan::DeletedRemotely {
                record: record.clone(),
            }
        };
        pages.insert(id.clone(), decision);
    }

    let plan = Plan {
        pages: pages.into_values().collect(),
    };
    for page in &plan.pages {
        tracing::debug!(id = %page.id(), class = %page.classification(), "classified");
    }
    Ok(plan)
}

fn classify_known(
    record: &PageRecord,
    remote_edited_at: DateTime<Utc>,
    local: Option<&LocalState>,
) -> PagePlan {
    let local_hash = match local {
        None | Some(LocalState::Missing) => {
            return PagePlan::Missing {
                record: record.clone(),
                remote_edited_at,
            }
        }
        Some(LocalState::Present { hash }) => hash,
    };

    let remote_newer = remote_edited_at > record.last_synced_at;
    let local_changed = *local_hash != record.content_hash;

    match (remote_newer, local_changed) {
        (false, false) => PagePlan::Unchanged {
            id: record.id.clone(),
        },
        (true, false) => PagePlan::RemoteAhead {
            record: record.clone(),
            remote_edited_at,
        },
        (false, true) => PagePlan::LocalAhead {
            record: record.clone(),
            local_hash: local_hash.clone(),
        },
        (true, true) => PagePlan::Conflict {
            record: record.clone(),
            remote_edited_at,
            local_hash: local_hash.clone(),
        },
    }
}
