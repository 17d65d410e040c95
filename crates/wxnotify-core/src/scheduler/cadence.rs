//! Firing times for the scheduler timers

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

use crate::config::SchedulerConfig;
use crate::model::Frequency;

/// When a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// At the top of every hour
    Hourly,
    /// Once a day at the given UTC time
    DailyAt(NaiveTime),
}

impl Cadence {
    /// Cadence for a frequency class, `None` for unrecognized frequencies
    pub fn for_frequency(frequency: Frequency, config: &SchedulerConfig) -> Option<Self> {
        match frequency {
            Frequency::Hourly => Some(Cadence::Hourly),
            Frequency::Daily => Some(Cadence::DailyAt(config.daily_at)),
            Frequency::Unknown => None,
        }
    }

    /// First firing strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Cadence::Hourly => {
                let top = now
                    .date_naive()
                    .and_hms_opt(now.hour(), 0, 0)
                    .map(|t| t.and_utc())
                    .unwrap_or(now);
                top + Duration::hours(1)
            }
            Cadence::DailyAt(at) => {
                let today = now.date_naive().and_time(*at).and_utc();
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
        }
    }
}
