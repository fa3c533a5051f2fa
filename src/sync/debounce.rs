use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs a job once after a delay unless the returned handle cancels it first.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledJob;
}

/// Cancellation handle. Dropping it without calling `cancel` also stops a
/// job that has not started.
pub struct ScheduledJob {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduledJob {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// One sleeper thread per scheduled job. The channel doubles as the cancel
/// signal: a message or a hang-up before the deadline means "do not run".
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledJob {
        let (tx, rx) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("tend-debounce".to_string())
            .spawn(move || match rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => job(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "could not spawn debounce thread");
        }
        ScheduledJob::new(move || {
            let _ = tx.send(());
        })
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    job: Option<ScheduledJob>,
}

/// Collapses a burst of `arm` calls into one run, `delay` after the last.
pub struct Debouncer {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    pub fn new(scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            scheduler,
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> DebounceState {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.job.is_some() {
            DebounceState::Armed
        } else {
            DebounceState::Idle
        }
    }

    /// Cancels any pending run and schedules `action` afresh.
    pub fn arm(&self, action: impl FnOnce() + Send + 'static) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.job.take() {
            previous.cancel();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let shared = Arc::clone(&self.slot);
        let job = self.scheduler.schedule(
            self.delay,
            Box::new(move || {
                {
                    let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.generation != generation {
                        return;
                    }
                    slot.job = None;
                }
                action();
            }),
        );
        slot.job = Some(job);
    }

    /// Returns true when a pending run was cancelled. A run whose timer has
    /// already fired but which has not started yet is skipped as well.
    pub fn cancel(&self) -> bool {
        let job = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.generation = slot.generation.wrapping_add(1);
            slot.job.take()
        };
        match job {
            Some(job) => {
                job.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Deterministic scheduler for tests: jobs run only inside `advance`.
#[cfg(test)]
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[cfg(test)]
#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    queue: Vec<(u64, Duration, Job)>,
}

#[cfg(test)]
impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }

    /// Moves time forward and runs every job whose deadline has passed.
    /// Jobs run with the internal lock released.
    pub fn advance(&self, by: Duration) {
        let due = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.now += by;
            let now = state.now;
            let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.queue)
                .into_iter()
                .partition(|(_, deadline, _)| *deadline <= now);
            state.queue = waiting;
            due
        };
        for (_, _, job) in due {
            job();
        }
    }
}

#[cfg(test)]
impl Scheduler for Arc<ManualScheduler> {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledJob {
        let id = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.next_id += 1;
            let id = state.next_id;
            let deadline = state.now + delay;
            state.queue.push((id, deadline, job));
            id
        };
        let weak = Arc::downgrade(self);
        ScheduledJob::new(move || {
            if let Some(scheduler) = weak.upgrade() {
                scheduler
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .queue
                    .retain(|(queued, _, _)| *queued != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{DebounceState, Debouncer, ManualScheduler, Scheduler, ThreadScheduler};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn burst_of_arms_runs_once_after_quiet_period() {
        let scheduler = ManualScheduler::new();
        let debouncer = Debouncer::new(Arc::new(Arc::clone(&scheduler)), Duration::from_millis(2000));
        let runs = counter();

        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            debouncer.arm(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            scheduler.advance(Duration::from_millis(500));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(debouncer.state(), DebounceState::Armed);
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_millis(1500));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.state(), DebounceState::Idle);
    }

    #[test]
    fn cancel_prevents_the_run() {
        let scheduler = ManualScheduler::new();
        let debouncer = Debouncer::new(Arc::new(Arc::clone(&scheduler)), Duration::from_secs(1));
        let runs = counter();
        let inner = Arc::clone(&runs);
        debouncer.arm(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        scheduler.advance(Duration::from_secs(5));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn thread_scheduler_runs_and_cancels() {
        let runs = counter();
        let inner = Arc::clone(&runs);
        let job = ThreadScheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        drop(job);

        let inner = Arc::clone(&runs);
        let job = ThreadScheduler.schedule(
            Duration::from_millis(200),
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        );
        job.cancel();
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
