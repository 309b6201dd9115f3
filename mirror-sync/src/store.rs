//! Local page store: scoped file access under the repository root.
//!
//! All paths handed to a [`PageStore`] are repository-relative, the same
//! paths the version-control adapter later commits.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Read/write access to page files.
pub trait PageStore {
    /// Contents of a file, `None` if it does not exist.
    fn read(&self, path: &Path) -> std::io::Result<Option<String>>;

    /// Replace (or create) a file.
    fn write(&self, path: &Path, contents: &str) -> std::io::Result<()>;

    /// Remove a file. Removing a missing file is not an error.
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// [`PageStore`] on the real filesystem.
///
/// Writes go to `<path>.mirror.tmp` and are renamed into place, so a reader
/// never observes a half-written page.
#[derive(Debug, Clone)]
pub struct DiskPageStore {
    root: PathBuf,
}

impl DiskPageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> std::io::Result<PathBuf> {
        let escapes = path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("path escapes the repository: {}", path.display()),
            ));
        }
        Ok(self.root.join(path))
    }
}

impl PageStore for DiskPageStore {
    fn read(&self, path: &Path) -> std::io::Result<Option<String>> {
        let full = self.resolve(path)?;
        match std::fs::read_to_string(&full) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = PathBuf::from(format!("{}.mirror.tmp", full.display()));
        std::fs::write(&tmp, contents)?;
        if let Err(err) = std::fs::rename(&tmp, &full) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
