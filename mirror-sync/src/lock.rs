//! RunLock: at most one reconciliation pass per repository.
//!
//! Uses advisory file locks (`flock(2)` on Unix) via the `fs2` crate on
//! `<repo>/.mirror/sync.lock`. The OS releases the lock when the holding
//! process exits, so a crash never leaves a stale lock behind.
//!
//! Acquisition never waits: a busy lock means another pass is active and
//! the caller skips.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// An exclusive hold on the repository's run lock.
///
/// Released when dropped (or via [`RunLock::release`]), including during
/// unwinding.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock at `path` without blocking.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if is_contended(&err) => return Ok(None),
            Err(err) => return Err(err),
        }

        // Holder pid, for diagnostics only.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// Whether some holder currently has the lock at `path`.
    pub fn is_held(path: &Path) -> std::io::Result<bool> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                FileExt::unlock(&file)?;
                Ok(false)
            }
            Err(err) if is_contended(&err) => Ok(true),
            Err(err) => Err(err),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly. Dropping the guard has the same effect.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to unlock run lock");
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind() || err.kind() == ErrorKind::WouldBlock
}
