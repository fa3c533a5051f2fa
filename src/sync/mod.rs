//! Git-backed sync for the data directory. Saves reported by the store are
//! queued and, after a quiet period, committed together with a message built
//! from what changed.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::SaveContext;
use crate::storage::{self, StorageError};
use crate::store::{SaveListener, DATA_FILES};

mod debounce;
mod git;
mod message;

pub use debounce::{Debouncer, Scheduler, ThreadScheduler};
pub use git::GitAdapter;
pub use message::commit_message;

#[cfg(test)]
pub use debounce::{DebounceState, ManualScheduler};

pub const GITIGNORE_FILE: &str = ".gitignore";
const GITIGNORE_RULES: [&str; 4] = ["backups/", "*.bak", "*.corrupt.*", ".*.tmp-*"];
const INIT_MESSAGE: &str = "Initialize tend data";
const MANUAL_MESSAGE: &str = "Sync data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub enabled: bool,
    pub auto_commit: bool,
    pub auto_push: bool,
    pub pull_on_startup: bool,
    pub commit_message: String,
    pub debounce_ms: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_commit: true,
            auto_push: false,
            pull_on_startup: false,
            commit_message: message::AUTO_TEMPLATE.to_string(),
            debounce_ms: 2000,
        }
    }
}

impl SyncOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RemoteInfo {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub is_repo: bool,
    pub branch: String,
    pub remote: Option<RemoteInfo>,
    pub ahead: u32,
    pub behind: u32,
    pub dirty: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_commit: Option<OffsetDateTime>,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommitSummary {
    pub commit: String,
    pub message: String,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushOutcome>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FlushOutcome {
    NothingPending,
    /// Files were staged but the index matched HEAD.
    NoChanges,
    Committed(CommitSummary),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InitOutcome {
    pub created: bool,
    pub committed: bool,
}

#[derive(Debug, Default)]
struct Pending {
    files: BTreeSet<String>,
    contexts: Vec<SaveContext>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub struct SyncEngine {
    data_dir: PathBuf,
    options: SyncOptions,
    git: GitAdapter,
    /// Held around every git invocation and while a batch is taken off the
    /// queue. Never taken while `pending` is held.
    op_lock: Mutex<()>,
    pending: Mutex<Pending>,
    debouncer: Debouncer,
    this: Weak<SyncEngine>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("data_dir", &self.data_dir)
            .field("options", &self.options)
            .finish()
    }
}

impl SyncEngine {
    pub fn new(data_dir: impl Into<PathBuf>, options: SyncOptions) -> Arc<Self> {
        Self::with_scheduler(data_dir, options, Arc::new(ThreadScheduler), GitAdapter::new())
    }

    pub fn with_scheduler(
        data_dir: impl Into<PathBuf>,
        options: SyncOptions,
        scheduler: Arc<dyn Scheduler>,
        git: GitAdapter,
    ) -> Arc<Self> {
        let data_dir = data_dir.into();
        let delay = options.debounce();
        Arc::new_cyclic(|this| Self {
            data_dir,
            options,
            git,
            op_lock: Mutex::new(()),
            pending: Mutex::new(Pending::default()),
            debouncer: Debouncer::new(scheduler, delay),
            this: this.clone(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_repository(&self) -> bool {
        self.git.is_repository(&self.data_dir)
    }

    #[cfg(test)]
    pub fn debounce_state(&self) -> DebounceState {
        self.debouncer.state()
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().contexts.len()
    }

    /// Queues a saved file for the next auto-commit and re-arms the timer.
    /// Does nothing unless auto-commit is switched on for an existing repo.
    pub fn on_file_saved(&self, file_name: &str, context: &SaveContext) {
        if !self.options.enabled || !self.options.auto_commit || !self.is_repository() {
            return;
        }
        {
            let mut pending = self.lock_pending();
            pending.files.insert(file_name.to_string());
            pending.contexts.push(context.clone());
        }

        let this = self.this.clone();
        self.debouncer.arm(move || {
            if let Some(engine) = this.upgrade() {
                engine.flush_quietly();
            }
        });
    }

    /// Commits everything queued so far, right now. Waits for a commit that
    /// is already running, so on return every save queued before the call
    /// is in git or back in the queue.
    pub fn flush(&self) -> Result<FlushOutcome, SyncError> {
        self.debouncer.cancel();
        // A batch leaves the queue only once this flush owns git.
        let _op = self.lock_op();
        let batch = std::mem::take(&mut *self.lock_pending());
        if batch.is_empty() {
            return Ok(FlushOutcome::NothingPending);
        }

        match self.commit_batch(&batch) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.requeue(batch);
                Err(err)
            }
        }
    }

    /// Auto-commit boundary: failures are logged, the files stay queued and
    /// are retried on the next flush.
    pub fn flush_quietly(&self) {
        match self.flush() {
            Ok(FlushOutcome::Committed(summary)) => {
                tracing::info!(commit = %summary.commit, message = %summary.message, "auto-commit");
                if let Some(PushOutcome::Failed { message }) = &summary.push {
                    tracing::warn!(error = %message, "auto-push failed");
                }
            }
            Ok(FlushOutcome::NoChanges) => {
                tracing::debug!("auto-commit skipped; staged diff is empty");
            }
            Ok(FlushOutcome::NothingPending) => {}
            Err(err) => tracing::warn!(error = %err, "auto-commit failed"),
        }
    }

    fn commit_batch(&self, batch: &Pending) -> Result<FlushOutcome, SyncError> {
        self.require_repository()?;
        let files: Vec<&str> = batch.files.iter().map(String::as_str).collect();
        self.git.add_paths(&self.data_dir, &files)?;
        if !self.git.has_staged_changes(&self.data_dir, &files)? {
            return Ok(FlushOutcome::NoChanges);
        }

        let message = commit_message(&batch.contexts, &self.options.commit_message);
        let commit = self.git.commit(&self.data_dir, &message)?;
        tracing::debug!(%commit, %message, files = ?files, "committed");

        let push = if self.options.auto_push {
            Some(match self.push_locked() {
                Ok(()) => PushOutcome::Pushed,
                Err(err) => PushOutcome::Failed {
                    message: err.to_string(),
                },
            })
        } else {
            None
        };

        Ok(FlushOutcome::Committed(CommitSummary {
            commit,
            message,
            files: batch.files.iter().cloned().collect(),
            push,
        }))
    }

    fn requeue(&self, batch: Pending) {
        let mut pending = self.lock_pending();
        let newer = std::mem::take(&mut pending.contexts);
        pending.files.extend(batch.files);
        pending.contexts = batch.contexts;
        pending.contexts.extend(newer);
    }

    /// Manual commit of every data file plus the ignore file. Queued saves
    /// are folded into the same commit.
    pub fn commit_all(&self, message: Option<&str>) -> Result<FlushOutcome, SyncError> {
        self.debouncer.cancel();
        let _op = self.lock_op();
        let batch = std::mem::take(&mut *self.lock_pending());

        let result = self.commit_all_locked(&batch, message);
        if result.is_err() {
            self.requeue(batch);
        }
        result
    }

    fn commit_all_locked(
        &self,
        batch: &Pending,
        message: Option<&str>,
    ) -> Result<FlushOutcome, SyncError> {
        self.require_repository()?;
        let files: Vec<&str> = DATA_FILES
            .iter()
            .copied()
            .chain(std::iter::once(GITIGNORE_FILE))
            .filter(|name| self.data_dir.join(name).exists())
            .collect();
        if files.is_empty() {
            return Ok(FlushOutcome::NothingPending);
        }
        self.git.add_paths(&self.data_dir, &files)?;
        if !self.git.has_staged_changes(&self.data_dir, &files)? {
            return Ok(FlushOutcome::NoChanges);
        }

        let message = match message.map(str::trim).filter(|value| !value.is_empty()) {
            Some(explicit) => explicit.to_string(),
            None if batch.contexts.is_empty() => MANUAL_MESSAGE.to_string(),
            None => commit_message(&batch.contexts, &self.options.commit_message),
        };
        let commit = self.git.commit(&self.data_dir, &message)?;
        Ok(FlushOutcome::Committed(CommitSummary {
            commit,
            message,
            files: files.iter().map(|name| (*name).to_string()).collect(),
            push: None,
        }))
    }

    /// Creates the repository if needed, makes sure the ignore rules are in
    /// place, and commits them. Running it again is harmless.
    pub fn init(&self) -> Result<InitOutcome, SyncError> {
        let _op = self.lock_op();
        let created = !self.is_repository();
        std::fs::create_dir_all(&self.data_dir)?;
        self.git.init(&self.data_dir)?;
        ensure_gitignore(&self.data_dir)?;

        self.git.add_paths(&self.data_dir, &[GITIGNORE_FILE])?;
        let committed = self
            .git
            .has_staged_changes(&self.data_dir, &[GITIGNORE_FILE])?;
        if committed {
            self.git.commit(&self.data_dir, INIT_MESSAGE)?;
        }
        tracing::info!(dir = %self.data_dir.display(), created, committed, "sync initialized");
        Ok(InitOutcome { created, committed })
    }

    /// Every sub-query is best effort; only the repository check decides
    /// whether the rest runs at all.
    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        let pending = self.pending_count();
        if !self.is_repository() {
            return Ok(SyncStatus {
                pending,
                ..SyncStatus::default()
            });
        }

        let _op = self.lock_op();
        let dir = &self.data_dir;
        let branch = self.git.current_branch(dir).unwrap_or_default();
        let remote = self.pick_remote().ok().map(|name| RemoteInfo {
            url: self.git.remote_url(dir, &name).unwrap_or_default(),
            name,
        });
        let (ahead, behind) = self.git.ahead_behind(dir).unwrap_or((0, 0));
        let dirty = self.git.status_clean(dir).map(|clean| !clean).unwrap_or(false);
        let last_commit = self.git.last_commit_time(dir).unwrap_or(None);

        Ok(SyncStatus {
            is_repo: true,
            branch,
            remote,
            ahead,
            behind,
            dirty,
            last_commit,
            pending,
        })
    }

    pub fn push(&self) -> Result<(), SyncError> {
        let _op = self.lock_op();
        self.push_locked()
    }

    pub fn pull(&self) -> Result<(), SyncError> {
        let _op = self.lock_op();
        self.require_repository()?;
        let remote = self.pick_remote()?;
        let branch = self.git.current_branch(&self.data_dir)?;
        self.git.pull_rebase(&self.data_dir, &remote, &branch)?;
        tracing::info!(%remote, %branch, "pulled");
        Ok(())
    }

    /// Start-up hook: pulls when configured. Failures are logged only.
    pub fn startup(&self) {
        if !self.options.enabled || !self.options.pull_on_startup || !self.is_repository() {
            return;
        }
        match self.pull() {
            Ok(()) => {}
            Err(err) if err.is_timeout() => {
                tracing::warn!(error = %err, "pull on startup timed out; continuing with local data");
            }
            Err(err) => tracing::warn!(error = %err, "pull on startup failed"),
        }
    }

    fn push_locked(&self) -> Result<(), SyncError> {
        self.require_repository()?;
        let remote = self.pick_remote()?;
        let branch = self.git.current_branch(&self.data_dir)?;
        if let Err(err) = self.git.push_branch(&self.data_dir, &remote, &branch) {
            if err.is_non_fast_forward() {
                return Err(SyncError::PushRejected { remote, branch });
            }
            return Err(err);
        }
        tracing::info!(%remote, %branch, "pushed");
        Ok(())
    }

    /// `origin` when present, otherwise the first configured remote.
    fn pick_remote(&self) -> Result<String, SyncError> {
        let remotes = self.git.remotes(&self.data_dir)?;
        if remotes.iter().any(|name| name == "origin") {
            return Ok("origin".to_string());
        }
        remotes.into_iter().next().ok_or(SyncError::NoRemote)
    }

    fn require_repository(&self) -> Result<(), SyncError> {
        if self.is_repository() {
            Ok(())
        } else {
            Err(SyncError::NotARepository(self.data_dir.clone()))
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_op(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SaveListener for SyncEngine {
    fn file_saved(&self, file_name: &str, context: &SaveContext) {
        self.on_file_saved(file_name, context);
    }
}

/// Appends any missing ignore rules, keeping whatever the user already has.
fn ensure_gitignore(data_dir: &Path) -> Result<(), SyncError> {
    let path = data_dir.join(GITIGNORE_FILE);
    let existing = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(SyncError::Io(err)),
    };

    let present: BTreeSet<&str> = existing.lines().map(str::trim).collect();
    let missing: Vec<&str> = GITIGNORE_RULES
        .iter()
        .copied()
        .filter(|rule| !present.contains(rule))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut contents = existing.clone();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    for rule in missing {
        contents.push_str(rule);
        contents.push('\n');
    }
    storage::write_atomic(&path, contents.as_bytes(), 0o644)?;
    Ok(())
}

#[derive(Debug)]
pub enum SyncError {
    NotARepository(PathBuf),
    NoRemote,
    GitUnavailable,
    Timeout {
        command: String,
        after: Duration,
    },
    GitCommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    /// The remote has commits this clone lacks.
    PushRejected {
        remote: String,
        branch: String,
    },
    Io(std::io::Error),
    Storage(StorageError),
}

impl SyncError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Timeout { .. })
    }

    pub fn is_non_fast_forward(&self) -> bool {
        match self {
            SyncError::GitCommandFailed { stderr, .. } => {
                let lower = stderr.to_ascii_lowercase();
                lower.contains("non-fast-forward")
                    || lower.contains("fetch first")
                    || lower.contains("rejected")
            }
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotARepository(path) => write!(
                f,
                "'{}' is not a git repository (run `tend sync init`)",
                path.display()
            ),
            SyncError::NoRemote => write!(f, "no git remote configured"),
            SyncError::GitUnavailable => write!(f, "git CLI is not installed"),
            SyncError::Timeout { command, after } => {
                write!(f, "git timed out after {}s: {}", after.as_secs(), command)
            }
            SyncError::GitCommandFailed {
                command,
                code,
                stderr,
            } => {
                write!(
                    f,
                    "git command failed (code {:?}): {} ({})",
                    code, command, stderr
                )
            }
            SyncError::PushRejected { remote, branch } => write!(
                f,
                "push to {}/{} was rejected because the remote has newer commits (run `tend sync pull` first)",
                remote, branch
            ),
            SyncError::Io(err) => write!(f, "I/O error: {}", err),
            SyncError::Storage(err) => write!(f, "storage error: {}", err),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::Io(err) => Some(err),
            SyncError::Storage(err) => Some(err),
            SyncError::NotARepository(_)
            | SyncError::NoRemote
            | SyncError::GitUnavailable
            | SyncError::Timeout { .. }
            | SyncError::GitCommandFailed { .. }
            | SyncError::PushRejected { .. } => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(value: std::io::Error) -> Self {
        SyncError::Io(value)
    }
}

impl From<StorageError> for SyncError {
    fn from(value: StorageError) -> Self {
        SyncError::Storage(value)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
