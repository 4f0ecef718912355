use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// Hour (facility-local) at which same-day express slots open.
pub const EXPRESS_OPENING_HOUR: u32 = 6;

/// Facility-local wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Clock pinned to a settable instant.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Express slots open at 06:00 on their own date and never on any other date.
pub fn express_window_open(slot_date: NaiveDate, now: NaiveDateTime) -> bool {
    slot_date == now.date() && now.hour() >= EXPRESS_OPENING_HOUR
}
