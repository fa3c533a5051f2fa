//! Point-in-time copies of the data files under `<data_dir>/backups/<name>/`.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::domain::{HabitStore, ItemKind, SaveContext, SaveOp, TaskStore, TimerStore};
use crate::storage::{self, StorageError, DATA_FILE_MODE};
use crate::store::{Store, DATA_FILES, HABITS_FILE, TASKS_FILE, TIMER_FILE};

pub const BACKUPS_DIR: &str = "backups";
pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;
const NAME_ATTEMPTS: u32 = 1000;

const NAME_FORMAT: &[FormatItem<'static>] = time::macros::format_description!(
    "[year][month][day]-[hour][minute][second]-[subsecond digits:3]"
);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupManifest {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub app_version: String,
    pub files: Vec<String>,
    #[serde(default)]
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// `None` when the manifest is missing or unreadable.
    pub manifest: Option<BackupManifest>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RestoreSummary {
    pub name: String,
    pub safety_backup: String,
    pub files: Vec<String>,
}

pub struct BackupManager {
    store: Store,
}

impl BackupManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.store.data_dir().join(BACKUPS_DIR)
    }

    /// Copies every data file that exists into a fresh backup directory and
    /// writes its manifest last.
    pub fn create(&self) -> Result<BackupInfo, BackupError> {
        let root = self.backups_dir();
        std::fs::create_dir_all(&root)?;

        let created_at = self.store.now();
        let (name, dir) = reserve_directory(&root, created_at)?;

        let mut files = Vec::new();
        let mut counts = BTreeMap::new();
        for file in DATA_FILES {
            let source = self.store.path(file);
            let bytes = match std::fs::read(&source) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::io(&source, err).into()),
            };
            storage::write_atomic(&dir.join(file), &bytes, DATA_FILE_MODE)?;
            counts.insert(file.to_string(), count_items(file, &bytes));
            files.push(file.to_string());
        }

        let manifest = BackupManifest {
            version: MANIFEST_VERSION,
            created_at,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            files,
            counts,
        };
        storage::write_json_atomic(&dir.join(MANIFEST_FILE), &manifest)?;
        tracing::info!(backup = %name, files = manifest.files.len(), "backup created");

        Ok(BackupInfo {
            name,
            path: dir,
            created_at,
            manifest: Some(manifest),
        })
    }

    /// Newest first. Directories whose manifest cannot be read are still
    /// listed when their name carries a timestamp.
    pub fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let root = self.backups_dir();
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|value| value.to_str()) else {
                continue;
            };
            let name = name.to_string();
            let manifest = read_manifest(&path);
            let created_at = match &manifest {
                Some(manifest) => manifest.created_at,
                None => match parse_backup_name(&name) {
                    Some(parsed) => parsed,
                    None => {
                        tracing::debug!(dir = %path.display(), "skipping non-backup directory");
                        continue;
                    }
                },
            };
            backups.push(BackupInfo {
                name,
                path,
                created_at,
                manifest,
            });
        }

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(backups)
    }

    /// Takes a safety backup of the current files, then copies the named
    /// backup over them. Any failure after the safety backup names it.
    pub fn restore(&self, name: &str) -> Result<RestoreSummary, BackupError> {
        let dir = self.existing_backup(name)?;
        let safety = self.create()?;

        let files = match self.restore_files(&dir) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(backup = name, safety = %safety.name, error = %err, "restore failed");
                return Err(BackupError::Restore {
                    safety_backup: safety.name,
                    message: err.to_string(),
                });
            }
        };

        for file in &files {
            if let Some(kind) = item_kind(file) {
                let context =
                    SaveContext::new(SaveOp::Restore, kind, &format!("backup {}", name));
                self.store.notify(file, &context);
            }
        }
        tracing::info!(backup = name, safety = %safety.name, "backup restored");

        Ok(RestoreSummary {
            name: name.to_string(),
            safety_backup: safety.name,
            files,
        })
    }

    fn restore_files(&self, dir: &Path) -> Result<Vec<String>, BackupError> {
        let files = match read_manifest(dir) {
            Some(manifest) => manifest.files,
            None => DATA_FILES
                .iter()
                .filter(|file| dir.join(file).is_file())
                .map(|file| (*file).to_string())
                .collect(),
        };

        for file in &files {
            if !DATA_FILES.contains(&file.as_str()) {
                return Err(BackupError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("manifest lists unknown file '{}'", file),
                )));
            }
            let source = dir.join(file);
            let bytes = std::fs::read(&source).map_err(|err| StorageError::io(&source, err))?;
            let target = self.store.path(file);
            storage::backup_existing(&target);
            storage::write_atomic(&target, &bytes, DATA_FILE_MODE)?;
        }

        for file in &files {
            validate(&self.store.path(file), file)?;
        }
        Ok(files)
    }

    /// Deletes all but the `keep` newest backups; returns how many went.
    pub fn prune(&self, keep: usize) -> Result<usize, BackupError> {
        let backups = self.list()?;
        let mut deleted = 0;
        for backup in backups.into_iter().skip(keep) {
            std::fs::remove_dir_all(&backup.path)?;
            tracing::debug!(backup = %backup.name, "pruned");
            deleted += 1;
        }
        Ok(deleted)
    }

    fn existing_backup(&self, name: &str) -> Result<PathBuf, BackupError> {
        let trimmed = name.trim();
        let plain = !trimmed.is_empty()
            && trimmed != "."
            && trimmed != ".."
            && !trimmed.contains(['/', '\\']);
        let dir = self.backups_dir().join(trimmed);
        if plain && dir.is_dir() {
            Ok(dir)
        } else {
            Err(BackupError::NotFound(name.to_string()))
        }
    }
}

fn reserve_directory(root: &Path, at: OffsetDateTime) -> Result<(String, PathBuf), BackupError> {
    let mut candidate = at;
    for _ in 0..NAME_ATTEMPTS {
        let name = backup_name(candidate);
        let dir = root.join(&name);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok((name, dir)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate += Duration::milliseconds(1);
            }
            Err(err) => return Err(StorageError::io(&dir, err).into()),
        }
    }
    Err(BackupError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "could not find a free backup name",
    )))
}

/// UTC so names sort the same way regardless of where they were taken.
pub fn backup_name(at: OffsetDateTime) -> String {
    let utc = at.to_offset(UtcOffset::UTC);
    utc.format(NAME_FORMAT).unwrap_or_else(|_| {
        format!(
            "{:04}{:02}{:02}-{:02}{:02}{:02}-{:03}",
            utc.year(),
            u8::from(utc.month()),
            utc.day(),
            utc.hour(),
            utc.minute(),
            utc.second(),
            utc.millisecond()
        )
    })
}

pub fn parse_backup_name(name: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(name, NAME_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn read_manifest(dir: &Path) -> Option<BackupManifest> {
    let bytes = std::fs::read(dir.join(MANIFEST_FILE)).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            tracing::debug!(dir = %dir.display(), error = %err, "unreadable manifest");
            None
        }
    }
}

fn item_kind(file: &str) -> Option<ItemKind> {
    match file {
        TASKS_FILE => Some(ItemKind::Task),
        HABITS_FILE => Some(ItemKind::Habit),
        TIMER_FILE => Some(ItemKind::Timer),
        _ => None,
    }
}

/// Length of the file's main list; 0 when the copy does not parse.
fn count_items(file: &str, bytes: &[u8]) -> usize {
    let key = match file {
        TASKS_FILE => "tasks",
        HABITS_FILE => "habits",
        TIMER_FILE => "entries",
        _ => return 0,
    };
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|value| value.get(key).and_then(|list| list.as_array().map(Vec::len)))
        .unwrap_or(0)
}

fn validate(path: &Path, file: &str) -> Result<(), BackupError> {
    let bytes = std::fs::read(path).map_err(|err| StorageError::io(path, err))?;
    let parsed = match file {
        TASKS_FILE => serde_json::from_slice::<TaskStore>(&bytes).map(|_| ()),
        HABITS_FILE => serde_json::from_slice::<HabitStore>(&bytes).map(|_| ()),
        TIMER_FILE => serde_json::from_slice::<TimerStore>(&bytes).map(|_| ()),
        _ => serde_json::from_slice::<serde_json::Value>(&bytes).map(|_| ()),
    };
    parsed.map_err(|err| StorageError::json(path, err).into())
}

#[derive(Debug)]
pub enum BackupError {
    NotFound(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Storage(StorageError),
    /// The restore did not complete; `safety_backup` holds the state from
    /// just before it started.
    Restore {
        safety_backup: String,
        message: String,
    },
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::NotFound(name) => write!(f, "backup '{}' not found", name),
            BackupError::Io(err) => write!(f, "I/O error: {}", err),
            BackupError::Json(err) => write!(f, "JSON error: {}", err),
            BackupError::Storage(err) => write!(f, "storage error: {}", err),
            BackupError::Restore {
                safety_backup,
                message,
            } => write!(
                f,
                "restore failed: {} (previous data saved as backup '{}')",
                message, safety_backup
            ),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            BackupError::Json(err) => Some(err),
            BackupError::Storage(err) => Some(err),
            BackupError::NotFound(_) | BackupError::Restore { .. } => None,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(value: std::io::Error) -> Self {
        BackupError::Io(value)
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(value: serde_json::Error) -> Self {
        BackupError::Json(value)
    }
}

impl From<StorageError> for BackupError {
    fn from(value: StorageError) -> Self {
        BackupError::Storage(value)
    }
}
