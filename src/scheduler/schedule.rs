// src/scheduler/schedule.rs
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};

use crate::config::ConfigError;

pub const DEFAULT_DAILY_TIMES: [(u32, u32); 3] = [(10, 0), (12, 0), (18, 0)];

/// Daily run times for the notification plans, kept sorted and unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    daily_times: Vec<NaiveTime>,
}

impl Schedule {
    pub fn new(mut daily_times: Vec<NaiveTime>) -> Result<Self, ConfigError> {
        if daily_times.is_empty() {
            return Err(ConfigError::Invalid {
                key: "schedule_times".to_string(),
                message: "at least one daily time is required".to_string(),
            });
        }
        daily_times.sort();
        daily_times.dedup();
        Ok(Self { daily_times })
    }

    pub fn daily_times(&self) -> &[NaiveTime] {
        &self.daily_times
    }

    /// The first scheduled time strictly after `now`, rolling over to the
    /// earliest time tomorrow.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        self.daily_times
            .iter()
            .map(|time| today.and_time(*time))
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| (today + TimeDelta::days(1)).and_time(self.daily_times[0]))
    }

    pub fn delay_until_next(&self, now: NaiveDateTime) -> Duration {
        (self.next_after(now) - now).to_std().unwrap_or_default()
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            daily_times: DEFAULT_DAILY_TIMES
                .iter()
                .filter_map(|(h, m)| NaiveTime::from_hms_opt(*h, *m, 0))
                .collect(),
        }
    }
}
