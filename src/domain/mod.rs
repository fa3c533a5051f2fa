//! Persisted data model. Each container (`TaskStore`, `HabitStore`,
//! `TimerStore`) is written as one JSON file; field names are the wire
//! contract other tools read.

use std::fmt;

use time::{Date, OffsetDateTime};

pub mod habit;
pub mod task;
pub mod timer;

pub use habit::{Frequency, Habit, HabitLog, HabitStore, ParseFrequencyError};
pub use task::{sort_tasks, ParsePriorityError, Priority, Task, TaskStore};
pub use timer::{CurrentTimer, TimerEntry, TimerStore};

time::serde::format_description!(date_format, Date, "[year]-[month]-[day]");

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day]");

const CONTEXT_NAME_MAX: usize = 50;

pub fn parse_date(raw: &str) -> Result<Date, time::error::Parse> {
    Date::parse(raw.trim(), DATE_FORMAT)
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day()))
}

fn unix_epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveOp {
    Add,
    Complete,
    Delete,
    Reopen,
    Toggle,
    Restore,
    Start,
    Stop,
}

impl SaveOp {
    pub fn as_str(self) -> &'static str {
        match self {
            SaveOp::Add => "add",
            SaveOp::Complete => "complete",
            SaveOp::Delete => "delete",
            SaveOp::Reopen => "reopen",
            SaveOp::Toggle => "toggle",
            SaveOp::Restore => "restore",
            SaveOp::Start => "start",
            SaveOp::Stop => "stop",
        }
    }

    /// Capitalized verb used to open a commit subject.
    pub fn verb(self) -> &'static str {
        match self {
            SaveOp::Add => "Add",
            SaveOp::Complete => "Complete",
            SaveOp::Delete => "Delete",
            SaveOp::Reopen => "Reopen",
            SaveOp::Toggle => "Toggle",
            SaveOp::Restore => "Restore",
            SaveOp::Start => "Start",
            SaveOp::Stop => "Stop",
        }
    }
}

impl fmt::Display for SaveOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Task,
    Habit,
    Timer,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Task => "task",
            ItemKind::Habit => "habit",
            ItemKind::Timer => "timer",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful write changed, in terms a commit message can use.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveContext {
    pub op: SaveOp,
    pub item: ItemKind,
    pub name: String,
}

impl SaveContext {
    pub fn new(op: SaveOp, item: ItemKind, name: &str) -> Self {
        Self {
            op,
            item,
            name: truncate_display(name, CONTEXT_NAME_MAX),
        }
    }
}

/// Cuts `value` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_display(value: &str, max: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let kept: String = trimmed.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::{format_date, parse_date, truncate_display, ItemKind, SaveContext, SaveOp};

    #[test]
    fn dates_parse_and_format_as_plain_calendar_days() {
        let parsed = parse_date(" 2026-02-28 ").expect("date should parse");
        assert_eq!(parsed, date!(2026-02-28));
        assert_eq!(format_date(parsed), "2026-02-28");
        assert!(parse_date("2026-02-30").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn save_context_truncates_long_names() {
        let long = "x".repeat(80);
        let context = SaveContext::new(SaveOp::Add, ItemKind::Task, &long);
        assert_eq!(context.name.chars().count(), 50);
        assert!(context.name.ends_with('…'));
        assert_eq!(truncate_display("  short  ", 10), "short");
    }
}
