//! Domain store: validated load-mutate-write operations over the three data
//! files. Every call reloads from disk; nothing is cached between calls, so
//! callers that need ordering must serialize their own mutations.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;

use crate::clock::Clock;
use crate::domain::{ItemKind, ParseFrequencyError, ParsePriorityError, SaveContext};
use crate::storage::{self, Loaded, StorageError};

mod habits;
mod tasks;
mod timer;


pub const TASKS_FILE: &str = "tasks.json";
pub const HABITS_FILE: &str = "habits.json";
pub const TIMER_FILE: &str = "timer.json";
pub const DATA_FILES: [&str; 3] = [TASKS_FILE, HABITS_FILE, TIMER_FILE];

pub const TASK_TEXT_MAX: usize = 200;
pub const PROJECT_MAX: usize = 60;
pub const HABIT_NAME_MAX: usize = 60;
pub const HABIT_ICON_MAX: usize = 12;
/// Longest window `project_totals` and `daily_breakdown` accept.
pub const MAX_REPORT_DAYS: u32 = 3660;

/// Receives one call per successful write, after the file is on disk.
pub trait SaveListener: Send + Sync {
    fn file_saved(&self, file_name: &str, context: &SaveContext);
}

#[derive(Clone)]
pub struct Store {
    data_dir: PathBuf,
    clock: Arc<dyn Clock>,
    listener: Option<Arc<dyn SaveListener>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.data_dir)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl Store {
    pub fn open(data_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|err| StorageError::io(&data_dir, err))?;
        Ok(Self {
            data_dir,
            clock,
            listener: None,
        })
    }

    pub fn set_listener(&mut self, listener: Arc<dyn SaveListener>) {
        self.listener = Some(listener);
    }

    #[cfg(test)]
    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    fn load<T>(&self, file_name: &str) -> Result<Loaded<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let loaded = storage::load_with_recovery(&self.path(file_name), T::default(), self.now())?;
        if let Some(warning) = loaded.warning() {
            tracing::warn!(file = file_name, "{warning}");
        }
        Ok(loaded)
    }

    fn persist<T: Serialize>(
        &self,
        file_name: &str,
        value: &T,
        context: SaveContext,
    ) -> Result<(), StoreError> {
        let path = self.path(file_name);
        storage::backup_existing(&path);
        storage::write_json_atomic(&path, value)?;
        tracing::debug!(
            file = file_name,
            op = context.op.as_str(),
            item = context.item.as_str(),
            name = %context.name,
            "saved"
        );
        self.notify(file_name, &context);
        Ok(())
    }

    pub(crate) fn notify(&self, file_name: &str, context: &SaveContext) {
        if let Some(listener) = &self.listener {
            listener.file_saved(file_name, context);
        }
    }
}

pub(crate) fn required_text(field: &str, raw: &str, max: usize) -> Result<String, StoreError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{field} cannot be empty")));
    }
    bounded(field, value, max)
}

pub(crate) fn optional_text(field: &str, raw: &str, max: usize) -> Result<String, StoreError> {
    bounded(field, raw.trim(), max)
}

fn bounded(field: &str, value: &str, max: usize) -> Result<String, StoreError> {
    let len = value.chars().count();
    if len > max {
        return Err(StoreError::Validation(format!(
            "{field} is too long ({len} characters, max {max})"
        )));
    }
    Ok(value.to_string())
}

#[derive(Debug)]
pub enum StoreError {
    /// Bad input; the caller must change it before retrying.
    Validation(String),
    /// The id does not exist (any more); the caller's view is stale.
    NotFound { kind: ItemKind, id: String },
    Storage(StorageError),
}

impl StoreError {
    pub(crate) fn not_found(kind: ItemKind, id: &str) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Validation(message) => write!(f, "{}", message),
            StoreError::NotFound { kind, id } => write!(f, "{} '{}' not found", kind, id),
            StoreError::Storage(err) => write!(f, "storage error: {}", err),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Validation(_) => None,
            StoreError::NotFound { .. } => None,
            StoreError::Storage(err) => Some(err),
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(value: StorageError) -> Self {
        StoreError::Storage(value)
    }
}

impl From<ParsePriorityError> for StoreError {
    fn from(value: ParsePriorityError) -> Self {
        StoreError::Validation(value.to_string())
    }
}

impl From<ParseFrequencyError> for StoreError {
    fn from(value: ParseFrequencyError) -> Self {
        StoreError::Validation(value.to_string())
    }
}

#[cfg(test)]
mod tests;
