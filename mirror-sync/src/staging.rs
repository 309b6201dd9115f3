//! All-or-nothing application of a pass's file changes.
//!
//! Each change snapshots the file it replaces before touching it. If any
//! change fails, every already-applied change is undone in reverse order and
//! the tree is back to its pre-pass state.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};
use crate::store::PageStore;

/// One pending file change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Write { path: PathBuf, contents: String },
    Remove { path: PathBuf },
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Write { path, .. } | FileChange::Remove { path } => path,
        }
    }
}

/// Ordered set of file changes for one pass.
#[derive(Debug, Default)]
pub struct WriteSet {
    changes: Vec<FileChange>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, path: PathBuf, contents: String) {
        self.changes.push(FileChange::Write { path, contents });
    }

    pub fn remove(&mut self, path: PathBuf) {
        self.changes.push(FileChange::Remove { path });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    /// Apply every change or none.
    ///
    /// Returns every path in the set. Identical writes and removals of absent
    /// files do no I/O but are still reported: a file left behind by an
    /// interrupted pass must still reach the next commit, and the
    /// version-control side decides whether anything really changed.
    pub fn apply(self, store: &dyn PageStore) -> Result<BTreeSet<PathBuf>, SyncError> {
        let mut applied: Vec<(PathBuf, Option<String>)> = Vec::new();
        let mut touched = BTreeSet::new();

        for change in self.changes {
            let path = change.path().to_path_buf();
            touched.insert(path.clone());
            let result = apply_one(store, &change, &mut applied);
            if let Err(err) = result {
                tracing::warn!(path = %path.display(), error = %err, "file change failed, rolling back");
                rollback(store, applied);
                return Err(io_err(path, err));
            }
        }
        Ok(touched)
    }
}

fn apply_one(
    store: &dyn PageStore,
    change: &FileChange,
    applied: &mut Vec<(PathBuf, Option<String>)>,
) -> std::io::Result<()> {
    let path = change.path();
    let original = store.read(path)?;
    match change {
        FileChange::Write { contents, .. } => {
            if original.as_deref() == Some(contents.as_str()) {
                return Ok(());
            }
            applied.push((path.to_path_buf(), original));
            store.write(path, contents)?;
        }
        FileChange::Remove { .. } => {
            if original.is_none() {
                return Ok(());
            }
            applied.push((path.to_path_buf(), original));
            store.remove(path)?;
        }
    }
    Ok(())
}

fn rollback(store: &dyn PageStore, applied: Vec<(PathBuf, Option<String>)>) {
    for (path, original) in applied.into_iter().rev() {
        let restored = match &original {
            Some(contents) => store.write(&path, contents),
            None => store.remove(&path),
        };
        if let Err(err) = restored {
            tracing::error!(path = %path.display(), error = %err, "rollback failed");
        }
    }
}
