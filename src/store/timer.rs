use time::{Date, Duration};

use crate::domain::timer::start_of_day;
use crate::domain::{CurrentTimer, ItemKind, SaveContext, SaveOp, TimerEntry, TimerStore};
use crate::storage::Loaded;

use super::{required_text, Store, StoreError, MAX_REPORT_DAYS, PROJECT_MAX, TIMER_FILE};

impl Store {
    pub fn load_timer(&self) -> Result<Loaded<TimerStore>, StoreError> {
        self.load(TIMER_FILE)
    }

    /// Starts tracking `project`. A timer that is already running is closed
    /// at the same instant before the new one begins.
    pub fn start_timer(&self, project: &str) -> Result<CurrentTimer, StoreError> {
        let project = required_text("project", project, PROJECT_MAX)?;

        let mut store = self.load_timer()?.value;
        let now = self.now();
        if let Some(running) = store.current.take() {
            tracing::debug!(project = %running.project, "closing running timer before switch");
            store.entries.push(running.close(now));
        }
        let current = CurrentTimer {
            project,
            started_at: now,
        };
        store.current = Some(current.clone());
        self.persist(
            TIMER_FILE,
            &store,
            SaveContext::new(SaveOp::Start, ItemKind::Timer, &current.project),
        )?;
        Ok(current)
    }

    /// Returns the closed entry, or `None` when nothing was running.
    pub fn stop_timer(&self) -> Result<Option<TimerEntry>, StoreError> {
        let mut store = self.load_timer()?.value;
        let Some(running) = store.current.take() else {
            return Ok(None);
        };
        let entry = running.close(self.now());
        store.entries.push(entry.clone());
        self.persist(
            TIMER_FILE,
            &store,
            SaveContext::new(SaveOp::Stop, ItemKind::Timer, &entry.project),
        )?;
        Ok(Some(entry))
    }

    pub fn today_total(&self, timer: &TimerStore) -> Duration {
        timer.today_total(self.now())
    }

    pub fn week_total(&self, timer: &TimerStore) -> Duration {
        timer.week_total(self.now())
    }

    /// Per-project totals over the last `days` calendar days including today.
    pub fn project_totals(
        &self,
        timer: &TimerStore,
        days: u32,
    ) -> Result<Vec<(String, Duration)>, StoreError> {
        let days = report_days(days)?;
        let now = self.now();
        let tomorrow = start_of_day(now) + Duration::days(1);
        let since = tomorrow
            .checked_sub(Duration::days(i64::from(days)))
            .ok_or_else(|| out_of_range(days))?;
        Ok(timer.project_totals(since, tomorrow, now))
    }

    pub fn daily_breakdown(
        &self,
        timer: &TimerStore,
        days: u32,
    ) -> Result<Vec<(Date, Duration)>, StoreError> {
        let days = report_days(days)?;
        Ok(timer.daily_breakdown(days, self.now()))
    }
}

fn report_days(days: u32) -> Result<u32, StoreError> {
    if days == 0 || days > MAX_REPORT_DAYS {
        return Err(out_of_range(days));
    }
    Ok(days)
}

fn out_of_range(days: u32) -> StoreError {
    StoreError::Validation(format!(
        "report window must be between 1 and {MAX_REPORT_DAYS} days (got {days})"
    ))
}
