mod common;

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use common::{git, pid, real_git_repo, FakeRemote};
use mirror_core::{ChangeIndex, MirrorConfig};
use mirror_sync::page_file::page_path;
use mirror_sync::{
    DiskPageStore, GitCli, PassOptions, PassOutcome, Reconciler, VcsError, VersionControl,
};

fn paths(items: &[&str]) -> BTreeSet<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

fn commit_count(dir: &std::path::Path) -> usize {
    git(dir, &["rev-list", "--count", "HEAD"]).trim().parse().unwrap()
}

#[test]
fn commits_exactly_the_given_paths() {
    let tmp = TempDir::new().unwrap();
    real_git_repo(tmp.path());
    fs::create_dir_all(tmp.path().join("pages")).unwrap();
    fs::write(tmp.path().join("pages/a.md"), "a").unwrap();
    fs::write(tmp.path().join("pages/b.md"), "b").unwrap();
    fs::write(tmp.path().join("unrelated.txt"), "leave me").unwrap();

    let vcs = GitCli::new(tmp.path());
    let id = vcs
        .stage_and_commit(&paths(&["pages/a.md", "pages/b.md"]), "Sync test | 2 pages | pull")
        .unwrap();

    assert_eq!(id.0, git(tmp.path(), &["rev-parse", "HEAD"]).trim());
    let files = git(tmp.path(), &["show", "--name-only", "--format=", "HEAD"]);
    let files: BTreeSet<&str> = files.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(files, BTreeSet::from(["pages/a.md", "pages/b.md"]));
    let status = git(tmp.path(), &["status", "--porcelain"]);
    assert!(status.contains("unrelated.txt"));
}

#[test]
fn unchanged_paths_are_nothing_to_commit() {
    let tmp = TempDir::new().unwrap();
    real_git_repo(tmp.path());
    let vcs = GitCli::new(tmp.path());

    let err = vcs
        .stage_and_commit(&paths(&["README.md"]), "Sync noop")
        .unwrap_err();
    assert!(matches!(err, VcsError::NothingToCommit));

    let err = vcs
        .stage_and_commit(&paths(&["pages/never-existed.md"]), "Sync noop")
        .unwrap_err();
    assert!(matches!(err, VcsError::NothingToCommit));
    assert_eq!(commit_count(tmp.path()), 1);
}

#[test]
fn removals_are_committed() {
    let tmp = TempDir::new().unwrap();
    real_git_repo(tmp.path());
    fs::remove_file(tmp.path().join("README.md")).unwrap();

    let vcs = GitCli::new(tmp.path());
    vcs.stage_and_commit(&paths(&["README.md"]), "Sync remove")
        .unwrap();

    let tracked = git(tmp.path(), &["ls-files"]);
    assert!(!tracked.contains("README.md"));
}

#[test]
fn last_sync_commit_is_found_by_prefix() {
    let tmp = TempDir::new().unwrap();
    real_git_repo(tmp.path());
    let vcs = GitCli::new(tmp.path());
    assert!(vcs.last_sync_commit("Sync").unwrap().is_none());

    fs::write(tmp.path().join("x.md"), "x").unwrap();
    let id = vcs
        .stage_and_commit(&paths(&["x.md"]), "Sync 2024-05-01T10:00:00Z | 1 pages | pull")
        .unwrap();

    let last = vcs.last_sync_commit("Sync").unwrap().unwrap();
    assert_eq!(last.id, id);
    assert_eq!(last.pages, 1);
    assert!(last.subject.ends_with("| pull"));
    assert!(!vcs.current_branch().unwrap().is_empty());
}

#[test]
fn push_without_remote_is_skipped() {
    let tmp = TempDir::new().unwrap();
    real_git_repo(tmp.path());
    GitCli::new(tmp.path()).push().unwrap();
}

#[test]
fn push_to_bare_remote() {
    let remote = TempDir::new().unwrap();
    git(remote.path(), &["init", "--quiet", "--bare"]);
    let tmp = TempDir::new().unwrap();
    real_git_repo(tmp.path());
    let branch = git(tmp.path(), &["rev-parse", "--abbrev-ref", "HEAD"]);
    git(
        tmp.path(),
        &["remote", "add", "origin", &remote.path().display().to_string()],
    );
    git(tmp.path(), &["push", "--quiet", "-u", "origin", branch.trim()]);

    fs::write(tmp.path().join("y.md"), "y").unwrap();
    let vcs = GitCli::new(tmp.path());
    let id = vcs.stage_and_commit(&paths(&["y.md"]), "Sync push").unwrap();
    vcs.push().unwrap();

    let remote_head = git(remote.path(), &["rev-parse", branch.trim()]);
    assert_eq!(remote_head.trim(), id.0);
}

#[test]
fn init_creates_repository_once() {
    let tmp = TempDir::new().unwrap();
    assert!(!GitCli::is_repo(tmp.path()));
    GitCli::init(tmp.path()).unwrap();
    assert!(GitCli::is_repo(tmp.path()));
    GitCli::init(tmp.path()).unwrap();
}

#[test]
fn conflicting_local_edit_survives_in_history() {
    let tmp = TempDir::new().unwrap();
    real_git_repo(tmp.path());
    let config = MirrorConfig::new("db");
    let mut index = ChangeIndex::open_in_memory().unwrap();
    let remote = FakeRemote::new();
    let vcs = GitCli::new(tmp.path());
    let store = DiskPageStore::new(tmp.path());
    let options = PassOptions {
        dry_run: false,
        push_remote: false,
    };
    let id = pid(1);
    remote.seed(&id, "Journal", "day one");

    let first = Reconciler::new(tmp.path(), &config, &mut index, &remote, &vcs, &store)
        .with_options(options)
        .run()
        .unwrap();
    assert!(matches!(first, PassOutcome::Completed(_)));
    assert_eq!(commit_count(tmp.path()), 2);

    // The agent edits and commits the mirror; a human edits the remote.
    let rel = page_path(&config.pages_dir, &id, "Journal");
    let file = tmp.path().join(&rel);
    let text = fs::read_to_string(&file).unwrap();
    fs::write(&file, text.replace("day one", "agent notes")).unwrap();
    git(tmp.path(), &["commit", "--quiet", "-am", "agent edit"]);
    remote.edit(&id, "human notes");

    let second = Reconciler::new(tmp.path(), &config, &mut index, &remote, &vcs, &store)
        .with_options(options)
        .run()
        .unwrap();
    let PassOutcome::Completed(summary) = second else {
        panic!("expected a completed pass");
    };
    assert_eq!(summary.conflicts, vec![id.clone()]);
    assert!(fs::read_to_string(&file).unwrap().contains("human notes"));

    let rel = rel.display().to_string();
    let previous = git(tmp.path(), &["show", &format!("HEAD~1:{rel}")]);
    assert!(previous.contains("agent notes"));
    let subject = git(tmp.path(), &["log", "-1", "--format=%s"]);
    assert!(subject.starts_with("Sync "));
    assert!(subject.trim().ends_with("| 1 pages | pull"));
    assert!(git(tmp.path(), &["status", "--porcelain", "--", "pages"]).is_empty());
}
