//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use mirror_core::{ChangeIndex, MirrorConfig, PageId, PageRecord, RemoteContent, RemoteListing};
use mirror_sync::page_file::{self, page_path};
use mirror_sync::{
    CommitId, DiskPageStore, DocumentService, PageStore, PassOptions, PassOutcome, PassSummary,
    Reconciler, RemoteError, SyncError, VcsError, VersionControl,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Page id whose first eight characters are unique per `n`.
pub fn pid(n: usize) -> PageId {
    PageId(format!("{n:08x}-0000-4000-8000-000000000000"))
}

// ---------------------------------------------------------------------------
// Document service
// ---------------------------------------------------------------------------

/// In-memory document service with a monotonic edit clock.
#[derive(Default)]
pub struct FakeRemote {
    pages: Mutex<BTreeMap<PageId, RemoteContent>>,
    clock: Mutex<Option<DateTime<Utc>>>,
    fetches: AtomicUsize,
    fetched: Mutex<Vec<PageId>>,
    writes: Mutex<Vec<(PageId, String)>>,
    failing_fetch: Mutex<Option<PageId>>,
    reject_writes: AtomicBool,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strictly increasing edit time, never behind the wall clock.
    fn tick(&self) -> DateTime<Utc> {
        let mut clock = self.clock.lock().unwrap();
        let now = Utc::now();
        let next = match *clock {
            Some(last) if last >= now => last + Duration::seconds(1),
            _ => now + Duration::seconds(1),
        };
        *clock = Some(next);
        next
    }

    /// Page that already existed an hour ago.
    pub fn seed(&self, id: &PageId, title: &str, body: &str) {
        self.pages.lock().unwrap().insert(
            id.clone(),
            RemoteContent {
                title: title.into(),
                parent_id: None,
                content: body.into(),
                remote_edited_at: Utc::now() - Duration::hours(1),
            },
        );
    }

    /// Page created (or re-created) just now.
    pub fn create(&self, id: &PageId, title: &str, body: &str) {
        let at = self.tick();
        self.pages.lock().unwrap().insert(
            id.clone(),
            RemoteContent {
                title: title.into(),
                parent_id: None,
                content: body.into(),
                remote_edited_at: at,
            },
        );
    }

    pub fn edit(&self, id: &PageId, body: &str) {
        let at = self.tick();
        let mut pages = self.pages.lock().unwrap();
        let page = pages.get_mut(id).expect("edit of unknown page");
        page.content = body.into();
        page.remote_edited_at = at;
    }

    pub fn retitle(&self, id: &PageId, title: &str) {
        let at = self.tick();
        let mut pages = self.pages.lock().unwrap();
        let page = pages.get_mut(id).expect("retitle of unknown page");
        page.title = title.into();
        page.remote_edited_at = at;
    }

    pub fn remove(&self, id: &PageId) {
        self.pages.lock().unwrap().remove(id);
    }

    pub fn content(&self, id: &PageId) -> Option<RemoteContent> {
        self.pages.lock().unwrap().get(id).cloned()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fetched_ids(&self) -> Vec<PageId> {
        let mut ids = self.fetched.lock().unwrap().clone();
        ids.sort();
        ids
    }

    pub fn writes(&self) -> Vec<(PageId, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn reset_counts(&self) {
        self.fetches.store(0, Ordering::SeqCst);
        self.fetched.lock().unwrap().clear();
        self.writes.lock().unwrap().clear();
    }

    pub fn fail_fetch_of(&self, id: &PageId) {
        *self.failing_fetch.lock().unwrap() = Some(id.clone());
    }

    pub fn reject_writes(&self) {
        self.reject_writes.store(true, Ordering::SeqCst);
    }
}

impl DocumentService for FakeRemote {
    fn list_pages(&self) -> Result<Vec<RemoteListing>, RemoteError> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|(id, page)| RemoteListing {
                id: id.clone(),
                remote_edited_at: page.remote_edited_at,
            })
            .collect())
    }

    fn fetch_content(&self, id: &PageId) -> Result<RemoteContent, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(id.clone());
        if self.failing_fetch.lock().unwrap().as_ref() == Some(id) {
            return Err(RemoteError::Transient("connection reset".into()));
        }
        self.content(id).ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    fn write_content(&self, id: &PageId, content: &str) -> Result<DateTime<Utc>, RemoteError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Conflict(id.clone()));
        }
        let at = self.tick();
        let mut pages = self.pages.lock().unwrap();
        let page = pages
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        page.content = content.into();
        page.remote_edited_at = at;
        self.writes.lock().unwrap().push((id.clone(), content.into()));
        Ok(at)
    }
}

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedCommit {
    pub paths: BTreeSet<PathBuf>,
    pub message: String,
    /// File contents at commit time, `None` for removals.
    pub tree: HashMap<PathBuf, Option<String>>,
}

/// Version control that remembers committed contents per path and refuses
/// empty commits like git does.
pub struct RecordingVcs {
    root: PathBuf,
    committed: Mutex<HashMap<PathBuf, Option<String>>>,
    commits: Mutex<Vec<RecordedCommit>>,
    pushes: AtomicUsize,
    pub fail_commit: AtomicBool,
    pub fail_push: AtomicBool,
}

impl RecordingVcs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            committed: Mutex::new(HashMap::new()),
            commits: Mutex::new(Vec::new()),
            pushes: AtomicUsize::new(0),
            fail_commit: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
        }
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.commits.lock().unwrap().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

impl VersionControl for RecordingVcs {
    fn stage_and_commit(
        &self,
        paths: &BTreeSet<PathBuf>,
        message: &str,
    ) -> Result<CommitId, VcsError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(VcsError::CommitFailed("simulated commit failure".into()));
        }
        let mut committed = self.committed.lock().unwrap();
        let mut tree = HashMap::new();
        for path in paths {
            let now = fs::read_to_string(self.root.join(path)).ok();
            let before = committed.get(path).cloned().flatten();
            if now != before {
                tree.insert(path.clone(), now);
            }
        }
        if tree.is_empty() {
            return Err(VcsError::NothingToCommit);
        }
        for (path, contents) in &tree {
            committed.insert(path.clone(), contents.clone());
        }

        let mut commits = self.commits.lock().unwrap();
        commits.push(RecordedCommit {
            paths: tree.keys().cloned().collect(),
            message: message.to_string(),
            tree,
        });
        Ok(CommitId(format!("{:040x}", commits.len())))
    }

    fn push(&self) -> Result<(), VcsError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(VcsError::PushFailed("remote rejected".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Page store
// ---------------------------------------------------------------------------

/// Disk store that fails every write to one path.
pub struct FailingStore {
    pub inner: DiskPageStore,
    pub fail_on: PathBuf,
}

impl PageStore for FailingStore {
    fn read(&self, path: &Path) -> std::io::Result<Option<String>> {
        self.inner.read(path)
    }

    fn write(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        if path == self.fail_on {
            return Err(std::io::Error::other("no space left on device"));
        }
        self.inner.write(path, contents)
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.inner.remove(path)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A scratch repository wired to fake collaborators.
pub struct Harness {
    pub dir: TempDir,
    pub config: MirrorConfig,
    pub index: ChangeIndex,
    pub remote: FakeRemote,
    pub vcs: RecordingVcs,
    pub store: DiskPageStore,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().expect("tempdir");
        let config = MirrorConfig::new("db-under-test");
        let index = ChangeIndex::open_in_memory().expect("index");
        let vcs = RecordingVcs::new(dir.path());
        let store = DiskPageStore::new(dir.path());
        Self {
            dir,
            config,
            index,
            remote: FakeRemote::new(),
            vcs,
            store,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn options() -> PassOptions {
        PassOptions {
            dry_run: false,
            push_remote: true,
        }
    }

    pub fn run(&mut self) -> Result<PassOutcome, SyncError> {
        Reconciler::new(
            self.dir.path(),
            &self.config,
            &mut self.index,
            &self.remote,
            &self.vcs,
            &self.store,
        )
        .with_options(Self::options())
        .run()
    }

    pub fn run_with<S: PageStore>(
        &mut self,
        store: &S,
        options: PassOptions,
    ) -> Result<PassOutcome, SyncError> {
        Reconciler::new(
            self.dir.path(),
            &self.config,
            &mut self.index,
            &self.remote,
            &self.vcs,
            store,
        )
        .with_options(options)
        .run()
    }

    /// Run a pass that must complete.
    pub fn pass(&mut self) -> PassSummary {
        match self.run().expect("pass") {
            PassOutcome::Completed(summary) => summary,
            other => panic!("expected a completed pass, got {other:?}"),
        }
    }

    pub fn record(&self, id: &PageId) -> PageRecord {
        self.index.get(id).expect("get").expect("record exists")
    }

    /// Repository-relative path of a page's file under `title`.
    pub fn rel_path(&self, id: &PageId, title: &str) -> PathBuf {
        page_path(&self.config.pages_dir, id, title)
    }

    /// Repository-relative path of a page's file under its indexed title.
    pub fn path_of(&self, id: &PageId) -> PathBuf {
        let record = self.record(id);
        self.rel_path(id, &record.title)
    }

    pub fn read_file(&self, id: &PageId) -> Option<String> {
        fs::read_to_string(self.root().join(self.path_of(id))).ok()
    }

    pub fn body_of(&self, id: &PageId) -> String {
        page_file::parse(&self.read_file(id).expect("page file")).body
    }

    /// Edit a page's body in the working tree, keeping its frontmatter.
    pub fn edit_local(&self, id: &PageId, body: &str) {
        let path = self.root().join(self.path_of(id));
        let parsed = page_file::parse(&fs::read_to_string(&path).expect("page file"));
        let front = parsed.front.expect("frontmatter");
        fs::write(&path, page_file::render(&front, body).expect("render")).expect("write");
    }
}

// ---------------------------------------------------------------------------
// Real git
// ---------------------------------------------------------------------------

/// Run git in `dir`, panicking with stderr on failure. Returns stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run `git {args:?}`: {e}"));
    if !output.status.success() {
        panic!(
            "`git {args:?}` failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Initialise a git repository with a local identity and one commit.
pub fn real_git_repo(dir: &Path) {
    git(dir, &["init", "--quiet"]);
    git(dir, &["config", "user.email", "mirror@test.local"]);
    git(dir, &["config", "user.name", "Mirror Test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    fs::write(dir.join("README.md"), "# mirror\n").expect("readme");
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "--quiet", "-m", "initial"]);
}
