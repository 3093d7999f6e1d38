//! Clock/calendar adapter.
//!
//! Single source of "what day / what week is it" for every epoch-keyed entity.
//! All day and week boundaries are computed in one fixed UTC offset taken from
//! configuration; instants are stored in UTC.

use crate::error::{QuestError, QuestResult};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use std::sync::Mutex;

/// Format of day keys (`2026-03-02`)
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Source of the current instant
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable time source for tests and replays
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Calendar in the configured zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    offset: FixedOffset,
}

impl Clock {
    /// Build a calendar for a fixed offset east of UTC, in minutes
    pub fn new(utc_offset_minutes: i32) -> QuestResult<Self> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                QuestError::validation(format!(
                    "utc offset of {} minutes is out of range",
                    utc_offset_minutes
                ))
            })?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Epoch day containing `now`
    pub fn day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Local hour (0-23) of `now`
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.offset).hour()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::utc()
    }
}

/// Storage key for an epoch day
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

/// Storage key for the ISO week (Monday start) containing `date`, e.g. `2026-W10`
pub fn week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

pub fn parse_day_key(key: &str) -> QuestResult<NaiveDate> {
    NaiveDate::parse_from_str(key, DAY_KEY_FORMAT)
        .map_err(|_| QuestError::Storage(format!("malformed day key '{}'", key)))
}

/// Whole days from `earlier` to `later` (negative if reversed)
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_respects_offset() {
        let instant = Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap();

        assert_eq!(
            Clock::utc().day(instant),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );

        // UTC+01:00 is already past midnight
        let cet = Clock::new(60).unwrap();
        assert_eq!(cet.day(instant), NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(cet.local_hour(instant), 0);

        // UTC-05:00 is still on the same day
        let est = Clock::new(-300).unwrap();
        assert_eq!(est.day(instant), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(est.local_hour(instant), 18);
    }

    #[test]
    fn test_offset_out_of_range() {
        assert!(Clock::new(24 * 60).is_err());
        // Seconds would not fit in an i32
        assert!(Clock::new(40_000_000).is_err());
        assert!(Clock::new(i32::MIN).is_err());
    }

    #[test]
    fn test_keys() {
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let next_monday = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();

        assert_eq!(day_key(monday), "2026-03-02");
        assert_eq!(parse_day_key("2026-03-02").unwrap(), monday);
        assert_eq!(week_key(monday), week_key(sunday));
        assert_ne!(week_key(sunday), week_key(next_monday));
        assert_eq!(week_key(monday), "2026-W10");
    }

    #[test]
    fn test_week_key_uses_iso_year() {
        // Jan 1st 2027 is a Friday and belongs to ISO week 53 of 2026
        let date = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(week_key(date), "2026-W53");
    }

    #[test]
    fn test_manual_time_source() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let source = ManualTimeSource::new(start);
        source.advance(chrono::Duration::days(1));
        assert_eq!(source.now(), start + chrono::Duration::days(1));
    }

    #[test]
    fn test_days_between() {
        let a = NaiveDate::from_ymd_opt(2026, 2, 27).unwrap();
        let b = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(days_between(a, b), 3);
        assert_eq!(days_between(b, a), -3);
    }
}
