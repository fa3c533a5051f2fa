#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
use time::Duration;
use time::{OffsetDateTime, UtcOffset};

/// Source of "now" for everything that buckets by calendar day.
///
/// The returned instant carries the offset that defines local days, so
/// `now().date()` is today's local date.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    /// Captures the local offset. Must run before any thread is spawned,
    /// otherwise `time` refuses to read it and UTC is used.
    pub fn local() -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or_else(|_| {
            tracing::debug!("local UTC offset is indeterminate; using UTC");
            UtcOffset::UTC
        });
        Self { offset }
    }

    #[cfg(test)]
    pub fn with_offset(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|poison| poison.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poison| poison.into_inner());
        *guard += by;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}
