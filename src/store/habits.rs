use std::collections::HashSet;

use time::OffsetDateTime;

use crate::domain::{
    format_date, parse_date, Frequency, Habit, HabitLog, HabitStore, ItemKind, SaveContext, SaveOp,
};
use crate::ids::generate_id;
use crate::storage::Loaded;

use super::{required_text, Store, StoreError, HABITS_FILE, HABIT_ICON_MAX, HABIT_NAME_MAX};

/// Streak for `id` as of the calendar day of `as_of`.
pub fn habit_streak_at(habits: &HabitStore, id: &str, as_of: OffsetDateTime) -> u32 {
    habits.streak_at(id, as_of.date())
}

impl Store {
    pub fn load_habits(&self) -> Result<Loaded<HabitStore>, StoreError> {
        self.load(HABITS_FILE)
    }

    pub fn add_habit(&self, name: &str, icon: &str) -> Result<Habit, StoreError> {
        self.add_habit_with_schedule(name, icon, Frequency::Daily, &[])
    }

    pub fn add_habit_with_schedule(
        &self,
        name: &str,
        icon: &str,
        frequency: Frequency,
        custom_days: &[u8],
    ) -> Result<Habit, StoreError> {
        let name = required_text("habit name", name, HABIT_NAME_MAX)?;
        let icon = required_text("habit icon", icon, HABIT_ICON_MAX)?;
        let custom_days = normalize_custom_days(frequency, custom_days)?;

        let mut store = self.load_habits()?.value;
        let now = self.now();
        let habit = Habit {
            id: generate_id(now, |candidate| store.contains(candidate)),
            name,
            icon,
            frequency,
            custom_days,
            created_at: now,
        };
        store.habits.push(habit.clone());
        self.persist(
            HABITS_FILE,
            &store,
            SaveContext::new(SaveOp::Add, ItemKind::Habit, &habit.name),
        )?;
        Ok(habit)
    }

    /// Flips today's completion; returns the new state.
    pub fn toggle_habit_today(&self, id: &str) -> Result<bool, StoreError> {
        let today = self.now().date();
        let currently_done = self.load_habits()?.value.is_done_on(id, today);
        self.set_habit_done_on_date(id, &format_date(today), !currently_done)?;
        Ok(!currently_done)
    }

    /// Drops every log for `(id, date)` and, when `done`, adds exactly one
    /// back, so duplicates never survive a call.
    pub fn set_habit_done_on_date(&self, id: &str, date: &str, done: bool) -> Result<(), StoreError> {
        let date = parse_date(date)
            .map_err(|err| StoreError::Validation(format!("invalid date '{}': {}", date, err)))?;

        let mut store = self.load_habits()?.value;
        let name = store
            .find(id)
            .map(|habit| habit.name.clone())
            .ok_or_else(|| StoreError::not_found(ItemKind::Habit, id))?;

        let key = format_date(date);
        store
            .logs
            .retain(|log| !(log.habit_id == id && log.date == key));
        if done {
            store.logs.push(HabitLog::new(id, date));
        }

        self.persist(
            HABITS_FILE,
            &store,
            SaveContext::new(SaveOp::Toggle, ItemKind::Habit, &name),
        )
    }

    /// Removes the habit and its logs in a single write.
    pub fn delete_habit(&self, id: &str) -> Result<Habit, StoreError> {
        let mut store = self.load_habits()?.value;
        let index = store
            .habits
            .iter()
            .position(|habit| habit.id == id)
            .ok_or_else(|| StoreError::not_found(ItemKind::Habit, id))?;
        let removed = store.habits.remove(index);
        store.logs.retain(|log| log.habit_id != id);
        self.persist(
            HABITS_FILE,
            &store,
            SaveContext::new(SaveOp::Delete, ItemKind::Habit, &removed.name),
        )?;
        Ok(removed)
    }

    /// Undo for `delete_habit`. Logs are merged without creating a second
    /// entry for any `(habit, date)` already present.
    pub fn restore_habit(&self, habit: Habit, logs: Vec<HabitLog>) -> Result<Habit, StoreError> {
        let mut habit = habit;
        habit.id = habit.id.trim().to_string();
        if habit.id.is_empty() {
            return Err(StoreError::Validation("habit id cannot be empty".to_string()));
        }
        habit.name = required_text("habit name", &habit.name, HABIT_NAME_MAX)?;
        habit.icon = required_text("habit icon", &habit.icon, HABIT_ICON_MAX)?;
        habit.custom_days = normalize_custom_days(habit.frequency, &habit.custom_days)?;
        if habit.created_at == OffsetDateTime::UNIX_EPOCH {
            habit.created_at = self.now();
        }

        let mut store = self.load_habits()?.value;
        if store.contains(&habit.id) {
            return Err(StoreError::Validation(format!(
                "habit '{}' already exists",
                habit.id
            )));
        }

        let mut seen: HashSet<(String, String)> = store
            .logs
            .iter()
            .map(|log| (log.habit_id.clone(), log.date.clone()))
            .collect();
        for log in logs {
            if log.habit_id != habit.id {
                continue;
            }
            let date = parse_date(&log.date).map_err(|err| {
                StoreError::Validation(format!("invalid log date '{}': {}", log.date, err))
            })?;
            let log = HabitLog::new(&habit.id, date);
            if seen.insert((log.habit_id.clone(), log.date.clone())) {
                store.logs.push(log);
            }
        }

        store.habits.push(habit.clone());
        self.persist(
            HABITS_FILE,
            &store,
            SaveContext::new(SaveOp::Restore, ItemKind::Habit, &habit.name),
        )?;
        Ok(habit)
    }

    pub fn habit_streak(&self, habits: &HabitStore, id: &str) -> u32 {
        habit_streak_at(habits, id, self.now())
    }

    pub fn habit_week(&self, habits: &HabitStore, id: &str) -> [bool; 7] {
        habits.week_at(id, self.now().date())
    }
}

fn normalize_custom_days(frequency: Frequency, days: &[u8]) -> Result<Vec<u8>, StoreError> {
    if frequency != Frequency::Custom {
        return Ok(Vec::new());
    }
    if let Some(bad) = days.iter().find(|day| **day > 6) {
        return Err(StoreError::Validation(format!(
            "custom day {bad} is out of range (0 = Sunday .. 6 = Saturday)"
        )));
    }
    let mut days = days.to_vec();
    days.sort_unstable();
    days.dedup();
    if days.is_empty() {
        return Err(StoreError::Validation(
            "custom frequency needs at least one day".to_string(),
        ));
    }
    Ok(days)
}
