use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Date, OffsetDateTime};

use super::{format_date, unix_epoch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Weekdays,
    Custom,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Weekdays,
        Frequency::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Weekdays => "weekdays",
            Frequency::Custom => "custom",
        }
    }

    pub fn is_daily(&self) -> bool {
        *self == Frequency::Daily
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "weekdays" => Ok(Frequency::Weekdays),
            "custom" => Ok(Frequency::Custom),
            _ => Err(ParseFrequencyError {
                value: value.to_string(),
            }),
        }
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Frequency::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFrequencyError {
    value: String,
}

impl fmt::Display for ParseFrequencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid frequency '{}': expected one of {}",
            self.value,
            Frequency::ALL
                .iter()
                .map(|frequency| frequency.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseFrequencyError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Frequency::is_daily")]
    pub frequency: Frequency,
    /// 0 = Sunday .. 6 = Saturday; only read when `frequency` is custom.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_days: Vec<u8>,
    #[serde(default = "unix_epoch", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HabitLog {
    pub habit_id: String,
    /// Plain `YYYY-MM-DD`.
    pub date: String,
}

impl HabitLog {
    pub fn new(habit_id: &str, date: Date) -> Self {
        Self {
            habit_id: habit_id.to_string(),
            date: format_date(date),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitStore {
    #[serde(default)]
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub logs: Vec<HabitLog>,
}

impl HabitStore {
    pub fn find(&self, id: &str) -> Option<&Habit> {
        self.habits.iter().find(|habit| habit.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn is_done_on(&self, id: &str, date: Date) -> bool {
        let key = format_date(date);
        self.logs
            .iter()
            .any(|log| log.habit_id == id && log.date == key)
    }

    fn done_dates(&self, id: &str) -> HashSet<&str> {
        self.logs
            .iter()
            .filter(|log| log.habit_id == id)
            .map(|log| log.date.as_str())
            .collect()
    }

    /// Consecutive completed days ending at `as_of`. An unmarked `as_of` does
    /// not break the streak; counting starts from the day before instead.
    pub fn streak_at(&self, id: &str, as_of: Date) -> u32 {
        let done = self.done_dates(id);
        let is_done = |date: Date| done.contains(format_date(date).as_str());

        let mut cursor = Some(as_of);
        if !is_done(as_of) {
            cursor = as_of.previous_day();
        }

        let mut streak = 0;
        while let Some(day) = cursor {
            if !is_done(day) {
                break;
            }
            streak += 1;
            cursor = day.previous_day();
        }
        streak
    }

    /// Completion flags for the seven days ending at `today`, oldest first.
    pub fn week_at(&self, id: &str, today: Date) -> [bool; 7] {
        let done = self.done_dates(id);
        let mut week = [false; 7];
        let mut day = Some(today);
        for slot in week.iter_mut().rev() {
            let Some(current) = day else {
                break;
            };
            *slot = done.contains(format_date(current).as_str());
            day = current.previous_day();
        }
        week
    }
}
