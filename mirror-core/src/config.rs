//! Per-repository configuration and state layout.
//!
//! # Storage layout
//!
//! ```text
//! <repo>/
//!   .mirror/
//!     .gitignore    ("*", engine state is never committed)
//!     config.yaml   (MirrorConfig, mode 0600)
//!     index.db      (ChangeIndex)
//!     sync.lock     (RunLock file)
//!   pages/          (one markdown file per page; configurable)
//! ```
//!
//! Every function takes the repository root explicitly (`*_at(repo, …)`),
//! so tests can point it at a `TempDir`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io, ConfigError};

pub const STATE_DIR: &str = ".mirror";
pub const CONFIG_FILE: &str = "config.yaml";
pub const INDEX_FILE: &str = "index.db";
pub const LOCK_FILE: &str = "sync.lock";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<repo>/.mirror/`
pub fn state_dir(repo: &Path) -> PathBuf {
    repo.join(STATE_DIR)
}

/// `<repo>/.mirror/config.yaml`: pure, no I/O.
pub fn config_path(repo: &Path) -> PathBuf {
    state_dir(repo).join(CONFIG_FILE)
}

/// `<repo>/.mirror/index.db`
pub fn index_path(repo: &Path) -> PathBuf {
    state_dir(repo).join(INDEX_FILE)
}

/// `<repo>/.mirror/sync.lock`
pub fn lock_path(repo: &Path) -> PathBuf {
    state_dir(repo).join(LOCK_FILE)
}

// ---------------------------------------------------------------------------
// 2. Config
// ---------------------------------------------------------------------------

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}

fn default_push_remote() -> bool {
    true
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_commit_prefix() -> String {
    "Sync".to_string()
}

/// Settings stored in `<repo>/.mirror/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Document-service database whose pages are mirrored.
    pub database_id: String,
    /// Page directory, relative to the repository root.
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,
    /// Run `git push` after each sync commit.
    #[serde(default = "default_push_remote")]
    pub push_remote: bool,
    /// Maximum number of content fetches in flight during one pass.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// First word of every sync commit message.
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
}

impl MirrorConfig {
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            pages_dir: default_pages_dir(),
            push_remote: default_push_remote(),
            fetch_concurrency: default_fetch_concurrency(),
            commit_prefix: default_commit_prefix(),
        }
    }

    /// Absolute page directory for a repository.
    pub fn pages_root(&self, repo: &Path) -> PathBuf {
        repo.join(&self.pages_dir)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_id.trim().is_empty() {
            return Err(ConfigError::Invalid("database_id must not be empty".into()));
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid("fetch_concurrency must be at least 1".into()));
        }
        if self.pages_dir.is_absolute() || self.pages_dir.starts_with(STATE_DIR) {
            return Err(ConfigError::Invalid(format!(
                "pages_dir must be a relative path outside {STATE_DIR}: {}",
                self.pages_dir.display()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// Load `<repo>/.mirror/config.yaml`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(repo: &Path) -> Result<MirrorConfig, ConfigError> {
    let path = config_path(repo);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| config_io(&path, e))?;
    let config: MirrorConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(repo: &Path, config: &MirrorConfig) -> Result<(), ConfigError> {
    config.validate()?;
    ensure_state_dir(repo)?;
    let path = config_path(repo);
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| config_io(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| config_io(&path, e))?;
    Ok(())
}

/// Create `<repo>/.mirror/` with its `.gitignore` if missing.
pub fn ensure_state_dir(repo: &Path) -> Result<PathBuf, ConfigError> {
    let dir = state_dir(repo);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| config_io(&dir, e))?;
    }
    let ignore = dir.join(".gitignore");
    if !ignore.exists() {
        std::fs::write(&ignore, "*\n").map_err(|e| config_io(&ignore, e))?;
    }
    Ok(dir)
}

/// Initialise a repository for mirroring.
///
/// Idempotent: an existing config is loaded and returned unchanged.
pub fn init_at(repo: &Path, database_id: &str) -> Result<MirrorConfig, ConfigError> {
    if config_path(repo).exists() {
        return load_at(repo);
    }
    let config = MirrorConfig::new(database_id);
    save_at(repo, &config)?;
    let pages = config.pages_root(repo);
    std::fs::create_dir_all(&pages).map_err(|e| config_io(&pages, e))?;
    Ok(config)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| config_io(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_live_under_state_dir() {
        let repo = Path::new("/repo");
        assert_eq!(config_path(repo), PathBuf::from("/repo/.mirror/config.yaml"));
        assert_eq!(index_path(repo), PathBuf::from("/repo/.mirror/index.db"));
        assert_eq!(lock_path(repo), PathBuf::from("/repo/.mirror/sync.lock"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let repo = TempDir::new().unwrap();
        let mut config = MirrorConfig::new("db123");
        config.fetch_concurrency = 8;
        save_at(repo.path(), &config).unwrap();
        assert_eq!(load_at(repo.path()).unwrap(), config);
        assert!(!config_path(repo.path()).with_extension("yaml.tmp").exists());
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let repo = TempDir::new().unwrap();
        ensure_state_dir(repo.path()).unwrap();
        std::fs::write(config_path(repo.path()), "database_id: abc\n").unwrap();
        let config = load_at(repo.path()).unwrap();
        assert_eq!(config.pages_dir, PathBuf::from("pages"));
        assert!(config.push_remote);
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.commit_prefix, "Sync");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let repo = TempDir::new().unwrap();
        ensure_state_dir(repo.path()).unwrap();
        std::fs::write(
            config_path(repo.path()),
            "database_id: abc\nfetch_concurrency: 0\n",
        )
        .unwrap();
        let err = load_at(repo.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn state_dir_is_git_ignored() {
        let repo = TempDir::new().unwrap();
        let dir = ensure_state_dir(repo.path()).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join(".gitignore")).unwrap(), "*\n");
    }

    #[test]
    fn init_is_idempotent() {
        let repo = TempDir::new().unwrap();
        let first = init_at(repo.path(), "db1").unwrap();
        let second = init_at(repo.path(), "other").unwrap();
        assert_eq!(first, second);
        assert!(repo.path().join("pages").is_dir());
    }
}
