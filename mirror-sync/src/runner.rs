//! ReconciliationRunner: one locked, logged, atomically committed pass.
//!
//! ```text
//! Idle → Locked → Planning → Fetching → Pushing → Writing → Committing → LoggingResult → Idle
//!          └────────┴──────────┴──────────┴─────────┴───────────┴──────────→ Failed
//! ```
//!
//! Nothing in the index or the working tree changes before Writing, and
//! Writing itself is all-or-nothing, so any failure up to and including
//! Writing leaves the repository as it was apart from one failure log entry.
//! Failures from Committing on are reported as [`SyncError::PartialCommit`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use mirror_core::config::lock_path;
use mirror_core::{
    ChangeIndex, Direction, MirrorConfig, Outcome, PageId, PageRecord, PageStatus,
    RemoteContent, SyncLogEntry,
};

use crate::error::{io_err, SyncError};
use crate::hash::{canonicalize, content_hash};
use crate::lock::RunLock;
use crate::page_file::{self, FrontMatter};
use crate::planner::{self, LocalSnapshot, LocalState, PagePlan, Plan};
use crate::policy::{resolve_conflict, WinningSide};
use crate::remote::{DocumentService, RemoteError};
use crate::staging::WriteSet;
use crate::store::PageStore;
use crate::vcs::{CommitId, VcsError, VersionControl};

/// Where a pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Locked,
    Planning,
    Fetching,
    Pushing,
    Writing,
    Committing,
    LoggingResult,
    Failed,
}

impl PassState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassState::Idle => "idle",
            PassState::Locked => "locked",
            PassState::Planning => "planning",
            PassState::Fetching => "fetching",
            PassState::Pushing => "pushing",
            PassState::Writing => "writing",
            PassState::Committing => "committing",
            PassState::LoggingResult => "logging",
            PassState::Failed => "failed",
        }
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassOptions {
    /// Plan only: no fetch, write, commit or log entry.
    pub dry_run: bool,
    /// Push the sync commit to the git remote afterwards.
    pub push_remote: bool,
}

/// What a finished pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub run_at: DateTime<Utc>,
    pub direction: Direction,
    pub pulled: Vec<PageId>,
    pub pushed: Vec<PageId>,
    pub deleted: Vec<PageId>,
    /// Pages edited on both sides; the remote copy was kept.
    pub conflicts: Vec<PageId>,
    pub unchanged: usize,
    /// Number of full-content fetches issued.
    pub fetches: usize,
    pub commit: Option<CommitId>,
    pub outcome: Outcome,
    pub message: String,
}

impl PassSummary {
    pub fn pages_touched(&self) -> usize {
        self.pulled.len() + self.pushed.len() + self.deleted.len()
    }
}

/// Result of [`Reconciler::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass holds the run lock. Nothing was touched or logged.
    Skipped,
    /// Dry run: the classification that a real pass would act on.
    Planned(Plan),
    Completed(PassSummary),
}

/// Drives reconciliation passes for one repository.
pub struct Reconciler<'a, D, V, S> {
    repo: &'a Path,
    config: &'a MirrorConfig,
    index: &'a mut ChangeIndex,
    remote: &'a D,
    vcs: &'a V,
    pages: &'a S,
    options: PassOptions,
    state: PassState,
}

/// Everything a pass will change, computed before anything is changed.
#[derive(Default)]
struct Staged {
    writes: WriteSet,
    upserts: Vec<PageRecord>,
    deleted: Vec<PageId>,
    pulled: Vec<PageId>,
    pushed: Vec<PageId>,
    conflicts: Vec<PageId>,
    unchanged: usize,
}

/// A local-ahead page after its body was accepted by the remote.
struct Pushed {
    body: String,
    remote_edited_at: DateTime<Utc>,
}

impl<'a, D, V, S> Reconciler<'a, D, V, S>
where
    D: DocumentService,
    V: VersionControl,
    S: PageStore,
{
    pub fn new(
        repo: &'a Path,
        config: &'a MirrorConfig,
        index: &'a mut ChangeIndex,
        remote: &'a D,
        vcs: &'a V,
        pages: &'a S,
    ) -> Self {
        Self {
            repo,
            config,
            index,
            remote,
            vcs,
            pages,
            options: PassOptions {
                dry_run: false,
                push_remote: config.push_remote,
            },
            state: PassState::Idle,
        }
    }

    pub fn with_options(mut self, options: PassOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Run one pass.
    ///
    /// Returns `Ok(Skipped)` when another pass is active. Every `Err` except
    /// a failure to take the lock has been recorded in the sync log.
    pub fn run(&mut self) -> Result<PassOutcome, SyncError> {
        let path = lock_path(self.repo);
        let lock = match RunLock::try_acquire(&path) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                tracing::info!(lock = %path.display(), "another pass is running, skipping");
                return Ok(PassOutcome::Skipped);
            }
            Err(err) => return Err(io_err(path, err)),
        };
        self.state = PassState::Locked;

        let started = Utc::now();
        let result = self.run_locked(started);
        let result = match result {
            Ok(outcome) => {
                self.state = PassState::Idle;
                Ok(outcome)
            }
            Err(err) => {
                let failed_in = self.state;
                self.state = PassState::Failed;
                tracing::error!(state = %failed_in, error = %err, "pass failed");
                self.log_failure(started, failed_in, &err);
                Err(err)
            }
        };

        lock.release();
        result
    }

    fn run_locked(&mut self, started: DateTime<Utc>) -> Result<PassOutcome, SyncError> {
        self.state = PassState::Planning;
        let records = self.index.list_all()?;
        let local = self.snapshot(&records)?;
        let listing = self.remote.list_pages()?;
        let plan = planner::plan(&listing, &records, &local)?;
        tracing::info!(
            listed = listing.len(),
            known = records.len(),
            to_fetch = plan.fetch_ids().len(),
            "planned pass"
        );

        if self.options.dry_run {
            self.state = PassState::Idle;
            return Ok(PassOutcome::Planned(plan));
        }

        self.state = PassState::Fetching;
        let fetch_ids = plan.fetch_ids();
        let fetched = fetch_all(self.remote, &fetch_ids, self.config.fetch_concurrency)?;

        self.state = PassState::Pushing;
        let pushed = self.push_local(&plan)?;

        self.state = PassState::Writing;
        let staged = self.stage(&plan, &fetched, &pushed, started)?;
        let Staged {
            writes,
            upserts,
            deleted,
            pulled,
            pushed,
            conflicts,
            unchanged,
        } = staged;
        let touched = writes.apply(self.pages)?;

        self.state = PassState::Committing;
        let direction = Direction::from_counts(pulled.len() + deleted.len(), pushed.len());
        let pages_touched = pulled.len() + pushed.len() + deleted.len();
        let commit = if touched.is_empty() {
            None
        } else {
            let message = format!(
                "{} {} | {} pages | {}",
                self.config.commit_prefix,
                started.to_rfc3339_opts(SecondsFormat::Secs, true),
                pages_touched,
                direction
            );
            match self.vcs.stage_and_commit(&touched, &message) {
                Ok(id) => {
                    tracing::info!(commit = %id.short(), files = touched.len(), "committed pass");
                    Some(id)
                }
                Err(VcsError::NothingToCommit) => None,
                Err(err) => {
                    return Err(SyncError::PartialCommit {
                        commit: "unknown".into(),
                        detail: err.to_string(),
                    })
                }
            }
        };
        let after_commit = |detail: String| SyncError::PartialCommit {
            commit: commit
                .as_ref()
                .map_or_else(|| "none".to_string(), |c| c.0.clone()),
            detail,
        };

        self.state = PassState::LoggingResult;
        self.index
            .apply_batch(&upserts, &deleted)
            .map_err(|e| after_commit(format!("index update failed: {e}")))?;

        let mut outcome = Outcome::Success;
        let mut message = describe(pulled.len(), pushed.len(), deleted.len(), conflicts.len());
        if commit.is_some() && self.options.push_remote {
            if let Err(err) = self.vcs.push() {
                tracing::warn!(error = %err, "git push failed");
                outcome = Outcome::Partial;
                message = format!("{message}; {err}");
            }
        }

        self.index
            .append_log(&SyncLogEntry {
                run_at: started,
                direction,
                pages_touched,
                outcome,
                message: message.clone(),
            })
            .map_err(|e| after_commit(format!("sync log append failed: {e}")))?;

        Ok(PassOutcome::Completed(PassSummary {
            run_at: started,
            direction,
            pulled,
            pushed,
            deleted,
            conflicts,
            unchanged,
            fetches: fetch_ids.len(),
            commit,
            outcome,
            message,
        }))
    }

    /// Current body hash of every live record's file.
    fn snapshot(&self, records: &[PageRecord]) -> Result<LocalSnapshot, SyncError> {
        let mut local = LocalSnapshot::with_capacity(records.len());
        for record in records {
            if record.status == PageStatus::Deleted {
                continue;
            }
            let path = self.path_for(&record.id, &record.title);
            let state = match self.pages.read(&path).map_err(|e| io_err(&path, e))? {
                Some(text) => LocalState::Present {
                    hash: page_file::parse(&text).hash(),
                },
                None => LocalState::Missing,
            };
            local.insert(record.id.clone(), state);
        }
        Ok(local)
    }

    /// Send every local-ahead body to the remote.
    fn push_local(&self, plan: &Plan) -> Result<HashMap<PageId, Pushed>, SyncError> {
        let mut pushed = HashMap::new();
        for page in &plan.pages {
            let PagePlan::LocalAhead { record, .. } = page else {
                continue;
            };
            let path = self.path_for(&record.id, &record.title);
            let text = self
                .pages
                .read(&path)
                .map_err(|e| io_err(&path, e))?
                .ok_or_else(|| {
                    io_err(
                        &path,
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "page file disappeared before push",
                        ),
                    )
                })?;
            let body = canonicalize(&page_file::parse(&text).body);
            let remote_edited_at = self.remote.write_content(&record.id, &body)?;
            tracing::info!(id = %record.id, "pushed local edit");
            pushed.insert(
                record.id.clone(),
                Pushed {
                    body,
                    remote_edited_at,
                },
            );
        }
        Ok(pushed)
    }

    fn stage(
        &self,
        plan: &Plan,
        fetched: &HashMap<PageId, RemoteContent>,
        pushed: &HashMap<PageId, Pushed>,
        started: DateTime<Utc>,
    ) -> Result<Staged, SyncError> {
        let mut staged = Staged::default();

        for page in &plan.pages {
            match page {
                PagePlan::Unchanged { .. } => staged.unchanged += 1,
                PagePlan::New { id, previous, .. } => {
                    let content = fetched_for(fetched, id)?;
                    self.stage_pull(&mut staged, id, previous.as_ref(), content, started)?;
                }
                PagePlan::RemoteAhead { record, .. } | PagePlan::Missing { record, .. } => {
                    let content = fetched_for(fetched, &record.id)?;
                    self.stage_pull(&mut staged, &record.id, Some(record), content, started)?;
                }
                PagePlan::Conflict {
                    record, local_hash, ..
                } => {
                    let content = fetched_for(fetched, &record.id)?;
                    let resolution = resolve_conflict(&content_hash(&content.content), local_hash);
                    debug_assert_eq!(resolution.winner, WinningSide::Remote);
                    if resolution.discards_local_edit {
                        tracing::warn!(
                            id = %record.id,
                            title = %record.title,
                            "page edited on both sides; remote copy wins, local edit overwritten (recoverable only if previously committed)"
                        );
                    }
                    staged.conflicts.push(record.id.clone());
                    self.stage_pull(&mut staged, &record.id, Some(record), content, started)?;
                }
                PagePlan::LocalAhead { record, .. } => {
                    let push = pushed.get(&record.id).ok_or_else(|| {
                        SyncError::ClassificationInvariantViolation {
                            id: record.id.clone(),
                            detail: "local-ahead page was not pushed".into(),
                        }
                    })?;
                    let front = FrontMatter {
                        id: record.id.clone(),
                        title: record.title.clone(),
                        parent_id: record.parent_id.clone(),
                        remote_edited_at: push.remote_edited_at,
                    };
                    let path = self.path_for(&record.id, &record.title);
                    staged.writes.write(path, render(&front, &push.body)?);
                    staged.upserts.push(PageRecord {
                        content_hash: content_hash(&push.body),
                        remote_edited_at: push.remote_edited_at,
                        last_synced_at: synced_at(Some(record), started, push.remote_edited_at),
                        status: PageStatus::Synced,
                        ..record.clone()
                    });
                    staged.pushed.push(record.id.clone());
                }
                PagePlan::DeletedRemotely { record } => {
                    tracing::info!(id = %record.id, title = %record.title, "page deleted remotely");
                    staged
                        .writes
                        .remove(self.path_for(&record.id, &record.title));
                    staged.deleted.push(record.id.clone());
                }
            }
        }
        Ok(staged)
    }

    fn stage_pull(
        &self,
        staged: &mut Staged,
        id: &PageId,
        previous: Option<&PageRecord>,
        content: &RemoteContent,
        started: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let path = self.path_for(id, &content.title);
        if let Some(prev) = previous {
            let old = self.path_for(id, &prev.title);
            if old != path {
                staged.writes.remove(old);
            }
        }

        let front = FrontMatter {
            id: id.clone(),
            title: content.title.clone(),
            parent_id: content.parent_id.clone(),
            remote_edited_at: content.remote_edited_at,
        };
        staged.writes.write(path, render(&front, &content.content)?);
        staged.upserts.push(PageRecord {
            id: id.clone(),
            title: content.title.clone(),
            parent_id: content.parent_id.clone(),
            content_hash: content_hash(&content.content),
            remote_edited_at: content.remote_edited_at,
            last_synced_at: synced_at(previous, started, content.remote_edited_at),
            status: PageStatus::Synced,
        });
        staged.pulled.push(id.clone());
        Ok(())
    }

    fn path_for(&self, id: &PageId, title: &str) -> PathBuf {
        page_file::page_path(&self.config.pages_dir, id, title)
    }

    fn log_failure(&mut self, started: DateTime<Utc>, state: PassState, err: &SyncError) {
        let entry = SyncLogEntry {
            run_at: started,
            direction: Direction::Noop,
            pages_touched: 0,
            outcome: Outcome::Failed,
            message: format!("failed while {state}: {err}"),
        };
        if let Err(log_err) = self.index.append_log(&entry) {
            tracing::error!(error = %log_err, "could not record failed pass in sync log");
        }
    }
}

fn render(front: &FrontMatter, body: &str) -> Result<String, SyncError> {
    page_file::render(front, body).map_err(|source| SyncError::Render {
        id: front.id.clone(),
        source,
    })
}

fn fetched_for<'c>(
    fetched: &'c HashMap<PageId, RemoteContent>,
    id: &PageId,
) -> Result<&'c RemoteContent, SyncError> {
    fetched
        .get(id)
        .ok_or_else(|| SyncError::ClassificationInvariantViolation {
            id: id.clone(),
            detail: "planned fetch produced no content".into(),
        })
}

/// Monotonic sync time: never earlier than before, the pass start, or the
/// remote edit the local copy now reflects.
fn synced_at(
    previous: Option<&PageRecord>,
    started: DateTime<Utc>,
    remote_edited_at: DateTime<Utc>,
) -> DateTime<Utc> {
    let floor = previous.map_or(started, |p| p.last_synced_at.max(started));
    floor.max(remote_edited_at)
}

fn describe(pulled: usize, pushed: usize, deleted: usize, conflicts: usize) -> String {
    if pulled + pushed + deleted == 0 {
        return "no changes".to_string();
    }
    let mut parts = Vec::new();
    if pulled > 0 {
        parts.push(format!("{pulled} pulled"));
    }
    if pushed > 0 {
        parts.push(format!("{pushed} pushed"));
    }
    if deleted > 0 {
        parts.push(format!("{deleted} deleted"));
    }
    if conflicts > 0 {
        parts.push(format!("{conflicts} conflicts resolved remote-first"));
    }
    parts.join(", ")
}

/// Fetch every id with up to `workers` concurrent requests.
///
/// The first failure stops the remaining workers and fails the whole set.
fn fetch_all<D: DocumentService>(
    remote: &D,
    ids: &[PageId],
    workers: usize,
) -> Result<HashMap<PageId, RemoteContent>, SyncError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let workers = workers.clamp(1, ids.len());
    let next = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);

    let results: Vec<Result<Vec<(PageId, RemoteContent)>, RemoteError>> =
        std::thread::scope(|scope| {
            let next = &next;
            let stop = &stop;
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        while !stop.load(Ordering::Relaxed) {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            let Some(id) = ids.get(i) else { break };
                            match remote.fetch_content(id) {
                                Ok(content) => {
                                    tracing::debug!(id = %id, "fetched page");
                                    done.push((id.clone(), content));
                                }
                                Err(err) => {
                                    stop.store(true, Ordering::Relaxed);
                                    return Err(err);
                                }
                            }
                        }
                        Ok(done)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

    let mut fetched = HashMap::with_capacity(ids.len());
    for result in results {
        fetched.extend(result?);
    }
    tracing::info!(count = fetched.len(), workers, "fetched page content");
    Ok(fetched)
}
