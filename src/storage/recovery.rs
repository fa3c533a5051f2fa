use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;

use super::{backup_path, sibling_with_suffix, write_json_atomic, StorageError, QUARANTINE_MARKER};

/// Which path `load_with_recovery` took. Anything other than `Clean` or
/// `Created` should reach the user as a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Clean,
    /// File was absent and has been initialized with the default value.
    Created,
    /// File was unusable; its `.bak` sibling was adopted.
    Recovered {
        reason: String,
        quarantined: Option<PathBuf>,
    },
    /// File was unusable and no backup helped; the default value was written.
    Reset {
        reason: String,
        quarantined: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: T,
    pub path: PathBuf,
    pub outcome: LoadOutcome,
}

impl<T> Loaded<T> {
    pub fn warning(&self) -> Option<String> {
        let path = self.path.display();
        match &self.outcome {
            LoadOutcome::Clean | LoadOutcome::Created => None,
            LoadOutcome::Recovered {
                reason,
                quarantined,
            } => Some(format!(
                "{path} was unreadable ({reason}); recovered from backup{}",
                quarantine_note(quarantined.as_deref())
            )),
            LoadOutcome::Reset {
                reason,
                quarantined,
            } => Some(format!(
                "{path} was unreadable ({reason}) and no usable backup exists; reset to empty{}",
                quarantine_note(quarantined.as_deref())
            )),
        }
    }
}

fn quarantine_note(quarantined: Option<&Path>) -> String {
    match quarantined {
        Some(path) => format!("; original kept at {}", path.display()),
        None => "; original could not be moved aside".to_string(),
    }
}

/// Reads `path` as JSON. Only a failed read of an existing file is an error;
/// every other path ends with a usable value and, when the file was bad, a
/// quarantined copy at `<path>.corrupt.<timestamp>`.
pub fn load_with_recovery<T>(
    path: &Path,
    default: T,
    now: OffsetDateTime,
) -> Result<Loaded<T>, StorageError>
where
    T: Serialize + DeserializeOwned,
{
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            write_json_atomic(path, &default)?;
            return Ok(Loaded {
                value: default,
                path: path.to_path_buf(),
                outcome: LoadOutcome::Created,
            });
        }
        Err(err) => return Err(StorageError::io(path, err)),
    };

    let reason = match parse::<T>(&bytes) {
        Ok(value) => {
            return Ok(Loaded {
                value,
                path: path.to_path_buf(),
                outcome: LoadOutcome::Clean,
            })
        }
        Err(reason) => reason,
    };

    tracing::warn!(path = %path.display(), %reason, "data file unreadable; attempting recovery");
    let recovered = read_backup::<T>(path);
    let quarantined = quarantine(path, now);

    let (value, outcome) = match recovered {
        Some(value) => (
            value,
            LoadOutcome::Recovered {
                reason,
                quarantined,
            },
        ),
        None => (
            default,
            LoadOutcome::Reset {
                reason,
                quarantined,
            },
        ),
    };

    if let Err(err) = write_json_atomic(path, &value) {
        tracing::warn!(path = %path.display(), error = %err, "could not rewrite recovered data file");
    }

    Ok(Loaded {
        value,
        path: path.to_path_buf(),
        outcome,
    })
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err("file is empty".to_string());
    }
    serde_json::from_slice(bytes).map_err(|err| err.to_string())
}

fn read_backup<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let backup = backup_path(path);
    let bytes = fs::read(&backup).ok()?;
    match parse(&bytes) {
        Ok(value) => {
            tracing::info!(backup = %backup.display(), "adopting backup contents");
            Some(value)
        }
        Err(reason) => {
            tracing::warn!(backup = %backup.display(), %reason, "backup is unusable");
            None
        }
    }
}

fn quarantine(path: &Path, now: OffsetDateTime) -> Option<PathBuf> {
    let target = quarantine_path(path, now);
    match fs::rename(path, &target) {
        Ok(()) => {
            tracing::warn!(from = %path.display(), to = %target.display(), "quarantined corrupt file");
            Some(target)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "quarantine rename failed");
            None
        }
    }
}

fn quarantine_path(path: &Path, now: OffsetDateTime) -> PathBuf {
    let format = format_description!("[year][month][day]T[hour][minute][second].[subsecond digits:3]");
    let stamp = now
        .to_offset(time::UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let mut candidate = sibling_with_suffix(path, &format!("{QUARANTINE_MARKER}{stamp}"));
    let mut attempt = 1;
    while candidate.exists() {
        candidate = sibling_with_suffix(path, &format!("{QUARANTINE_MARKER}{stamp}-{attempt}"));
        attempt += 1;
    }
    candidate
}
