use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, Time};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEntry {
    pub project: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
}

impl TimerEntry {
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at).max(Duration::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTimer {
    pub project: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

impl CurrentTimer {
    pub fn close(self, ended_at: OffsetDateTime) -> TimerEntry {
        TimerEntry {
            project: self.project,
            started_at: self.started_at,
            ended_at,
        }
    }

    pub fn elapsed(&self, now: OffsetDateTime) -> Duration {
        (now - self.started_at).max(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentTimer>,
    #[serde(default)]
    pub entries: Vec<TimerEntry>,
}

/// Length of the intersection of `[a_start, a_end)` and `[b_start, b_end)`;
/// zero when they are disjoint or either interval is inverted.
pub fn overlap(
    a_start: OffsetDateTime,
    a_end: OffsetDateTime,
    b_start: OffsetDateTime,
    b_end: OffsetDateTime,
) -> Duration {
    let start = a_start.max(b_start);
    let end = a_end.min(b_end);
    (end - start).max(Duration::ZERO)
}

pub fn start_of_day(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_time(Time::MIDNIGHT)
}

/// Weeks start on Sunday.
pub fn start_of_week(at: OffsetDateTime) -> OffsetDateTime {
    let back = i64::from(at.weekday().number_days_from_sunday());
    start_of_day(at) - Duration::days(back)
}

impl TimerStore {
    /// Each span as `(project, start, end)`; the running timer ends at `now`.
    fn spans(&self, now: OffsetDateTime) -> impl Iterator<Item = (&str, OffsetDateTime, OffsetDateTime)> {
        self.entries
            .iter()
            .map(|entry| (entry.project.as_str(), entry.started_at, entry.ended_at))
            .chain(
                self.current
                    .iter()
                    .map(move |current| (current.project.as_str(), current.started_at, now)),
            )
    }

    pub fn total_between(
        &self,
        window_start: OffsetDateTime,
        window_end: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Duration {
        self.spans(now)
            .map(|(_, start, end)| overlap(start, end, window_start, window_end))
            .fold(Duration::ZERO, |total, part| total + part)
    }

    pub fn today_total(&self, now: OffsetDateTime) -> Duration {
        let start = start_of_day(now);
        self.total_between(start, start + Duration::days(1), now)
    }

    pub fn week_total(&self, now: OffsetDateTime) -> Duration {
        let start = start_of_week(now);
        self.total_between(start, start + Duration::weeks(1), now)
    }

    /// Per-project time inside the window, largest first. Ties keep the
    /// order in which projects first appear.
    pub fn project_totals(
        &self,
        window_start: OffsetDateTime,
        window_end: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Vec<(String, Duration)> {
        let mut order: Vec<String> = Vec::new();
        let mut totals: HashMap<String, Duration> = HashMap::new();
        for (project, start, end) in self.spans(now) {
            let part = overlap(start, end, window_start, window_end);
            if part <= Duration::ZERO {
                continue;
            }
            let slot = totals.entry(project.to_string()).or_insert_with(|| {
                order.push(project.to_string());
                Duration::ZERO
            });
            *slot += part;
        }

        let mut result: Vec<(String, Duration)> = order
            .into_iter()
            .map(|project| {
                let total = totals.get(&project).copied().unwrap_or(Duration::ZERO);
                (project, total)
            })
            .collect();
        result.sort_by(|a, b| b.1.cmp(&a.1));
        result
    }

    /// Totals for the `days` calendar days ending today, largest first.
    /// Days with equal totals stay oldest first. Days before the earliest
    /// representable date are left out.
    pub fn daily_breakdown(&self, days: u32, now: OffsetDateTime) -> Vec<(Date, Duration)> {
        let today = start_of_day(now);
        let mut rows: Vec<(Date, Duration)> = (0..i64::from(days))
            .rev()
            .filter_map(|back| today.checked_sub(Duration::days(back)))
            .map(|start| {
                let end = start.checked_add(Duration::days(1)).unwrap_or(start);
                (start.date(), self.total_between(start, end, now))
            })
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        rows
    }
}
