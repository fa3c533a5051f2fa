use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backup::{BackupError, BackupManager};
use crate::clock::Clock;
use crate::config::{Config, ConfigError};
use crate::domain::{Habit, HabitLog, ItemKind};
use crate::ids::display_id;
use crate::store::{Store, StoreError};
use crate::sync::{SyncEngine, SyncError};

/// A deleted habit together with its history, in the shape `habit restore`
/// accepts back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovedHabit {
    pub habit: Habit,
    #[serde(default)]
    pub logs: Vec<HabitLog>,
}

pub struct App {
    config: Config,
    store: Store,
    sync: Arc<SyncEngine>,
}

impl App {
    /// Opens the store and wires the sync engine in as its save listener.
    pub fn open(data_dir: PathBuf, config: Config, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        let mut store = Store::open(&data_dir, clock)?;
        let sync = SyncEngine::new(&data_dir, config.sync.clone());
        store.set_listener(sync.clone());
        tracing::debug!(dir = %data_dir.display(), sync = config.sync.enabled, "opened data directory");
        Ok(Self {
            config,
            store,
            sync,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.store.clone())
    }

    /// Commits whatever the debounce timer has not flushed yet.
    pub fn shutdown(&self) {
        self.sync.flush_quietly();
    }

    pub fn resolve_task_id(&self, raw: &str) -> Result<String, AppError> {
        let tasks = self.store.load_tasks()?.value;
        resolve_id(tasks.tasks.iter().map(|task| task.id.as_str()), raw, ItemKind::Task)
    }

    pub fn resolve_habit_id(&self, raw: &str) -> Result<String, AppError> {
        let habits = self.store.load_habits()?.value;
        resolve_id(
            habits.habits.iter().map(|habit| habit.id.as_str()),
            raw,
            ItemKind::Habit,
        )
    }

    pub fn remove_habit(&self, id: &str) -> Result<RemovedHabit, AppError> {
        let logs: Vec<HabitLog> = self
            .store
            .load_habits()?
            .value
            .logs
            .into_iter()
            .filter(|log| log.habit_id == id)
            .collect();
        let habit = self.store.delete_habit(id)?;
        Ok(RemovedHabit { habit, logs })
    }

    pub fn restore_habit(&self, removed: RemovedHabit) -> Result<Habit, AppError> {
        Ok(self.store.restore_habit(removed.habit, removed.logs)?)
    }
}

/// Exact id first, then the short id printed in listings.
fn resolve_id<'a>(
    ids: impl Iterator<Item = &'a str>,
    raw: &str,
    kind: ItemKind,
) -> Result<String, AppError> {
    let wanted = raw.trim();
    let mut short_matches = Vec::new();
    for id in ids {
        if id == wanted {
            return Ok(id.to_string());
        }
        if display_id(id) == wanted {
            short_matches.push(id.to_string());
        }
    }
    match short_matches.len() {
        0 => Err(StoreError::NotFound {
            kind,
            id: wanted.to_string(),
        }
        .into()),
        1 => Ok(short_matches.remove(0)),
        _ => Err(AppError::InvalidArgument(format!(
            "{} id '{}' is ambiguous; use the full id",
            kind, wanted
        ))),
    }
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    Store(StoreError),
    Sync(SyncError),
    Backup(BackupError),
    InvalidArgument(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Json(err) => write!(f, "invalid JSON: {}", err),
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Store(err) => write!(f, "{}", err),
            AppError::Sync(err) => write!(f, "sync error: {}", err),
            AppError::Backup(err) => write!(f, "backup error: {}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Sync(err) => Some(err),
            AppError::Backup(err) => Some(err),
            AppError::InvalidArgument(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Json(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Store(value)
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        AppError::Sync(value)
    }
}

impl From<BackupError> for AppError {
    fn from(value: BackupError) -> Self {
        AppError::Backup(value)
    }
}

#[cfg(test)]
mod tests;
