//! Durable JSON persistence: atomic replacement, `.bak` siblings and
//! load-time recovery with quarantine.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

mod atomic;
mod recovery;

pub use atomic::{backup_existing, write_atomic, write_json_atomic, DATA_FILE_MODE};
#[cfg(test)]
pub(crate) use atomic::write_atomic_interrupted;
pub use recovery::{load_with_recovery, Loaded};
#[cfg(test)]
pub use recovery::LoadOutcome;

pub const BACKUP_SUFFIX: &str = ".bak";
pub const QUARANTINE_MARKER: &str = ".corrupt.";

#[derive(Debug)]
pub enum StorageError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        StorageError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, source } => {
                write!(f, "I/O error on '{}': {}", path.display(), source)
            }
            StorageError::Json { path, source } => {
                write!(f, "JSON error in '{}': {}", path.display(), source)
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Json { source, .. } => Some(source),
        }
    }
}

/// `tasks.json` -> `tasks.json<suffix>`, in the same directory.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

pub fn backup_path(path: &Path) -> PathBuf {
    sibling_with_suffix(path, BACKUP_SUFFIX)
}
