//! Domain types shared by the index, the planner and the runner.
//!
//! Status, direction and outcome are closed enums; their string forms are
//! only used at the storage and display boundaries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque, stable identifier of a document-service page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub String);

impl PageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters of the id, dashes removed. Used in file names.
    pub fn short(&self) -> String {
        self.0.chars().filter(|c| *c != '-').take(8).collect()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Reconciliation status of a locally known page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PageStatus {
    #[default]
    Synced,
    PendingPush,
    PendingPull,
    Conflict,
    Deleted,
}

impl PageStatus {
    pub const ALL: [PageStatus; 5] = [
        PageStatus::Synced,
        PageStatus::PendingPush,
        PageStatus::PendingPull,
        PageStatus::Conflict,
        PageStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Synced => "synced",
            PageStatus::PendingPush => "pending-push",
            PageStatus::PendingPull => "pending-pull",
            PageStatus::Conflict => "conflict",
            PageStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PageStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown page status '{s}'"))
    }
}

/// Which way content moved during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Pull,
    Push,
    Both,
    #[default]
    Noop,
}

impl Direction {
    /// Direction implied by the number of pulled (incl. cleaned up) and
    /// pushed pages.
    pub fn from_counts(pulled: usize, pushed: usize) -> Self {
        match (pulled > 0, pushed > 0) {
            (true, true) => Direction::Both,
            (true, false) => Direction::Pull,
            (false, true) => Direction::Push,
            (false, false) => Direction::Noop,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Pull => "pull",
            Direction::Push => "push",
            Direction::Both => "both",
            Direction::Noop => "noop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull" => Ok(Direction::Pull),
            "push" => Ok(Direction::Push),
            "both" => Ok(Direction::Both),
            "noop" => Ok(Direction::Noop),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// Final status of a reconciliation pass as recorded in the sync log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    /// Committed, but a follow-up step (remote push) failed.
    Partial,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "partial" => Ok(Outcome::Partial),
            "failed" => Ok(Outcome::Failed),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Cached metadata for one page known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: PageId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PageId>,
    /// SHA-256 hex digest of the canonicalised page body.
    pub content_hash: String,
    pub remote_edited_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
    pub status: PageStatus,
}

/// One append-only audit entry per reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub run_at: DateTime<Utc>,
    pub direction: Direction,
    pub pages_touched: usize,
    pub outcome: Outcome,
    #[serde(default)]
    pub message: String,
}

/// A metadata-only entry of the remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub id: PageId,
    pub remote_edited_at: DateTime<Utc>,
}

/// Full content of a remote page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContent {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PageId>,
    pub content: String,
    pub remote_edited_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
