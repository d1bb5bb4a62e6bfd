//! Wall-clock access, injectable so day boundaries and default dates are testable.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut current) = self.current.lock() {
            *current = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.current
            .lock()
            .map(|c| *c)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Local calendar arithmetic for a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct LocalDay {
    offset: FixedOffset,
}

impl LocalDay {
    /// Offsets outside ±24h fall back to UTC.
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                log::warn!("invalid UTC offset of {utc_offset_minutes} minutes, using UTC");
                Utc.fix()
            });
        Self { offset }
    }

    /// Calendar day of `at` in local time.
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// `[start, end)` of a local calendar day, expressed in UTC.
    pub fn bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default();
        let start = self
            .offset
            .from_local_datetime(&midnight)
            .single()
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
        (start, start + Duration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));
    }

    #[test]
    fn test_local_day_bounds_with_offset() {
        let local = LocalDay::new(60);
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (start, end) = local.bounds(day);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 2, 28, 23, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap());
    }

    #[test]
    fn test_day_of_crosses_midnight() {
        let local = LocalDay::new(60);
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(local.day_of(late), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let midnight = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        for minutes in [i32::MAX, i32::MIN, 24 * 60 + 1] {
            assert_eq!(LocalDay::new(minutes).bounds(day).0, midnight);
        }
    }
}
