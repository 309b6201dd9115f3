//! Error types for mirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from ChangeIndex operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Could not create the directory holding the index database.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored column held a value outside its enum domain.
    #[error("corrupt index row for {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

/// All errors that can arise from repository configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The repository has not been initialised.
    #[error("config not found at {path}; run `mirror init` first")]
    NotFound { path: PathBuf },

    /// A value is present but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
