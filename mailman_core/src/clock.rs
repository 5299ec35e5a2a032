//! Wall clock access and midnight arithmetic.

use std::{
    fmt::Debug,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};

/// Source of the current local time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to. Used by tests and tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The first instant of the calendar day following `now`, in the timezone of `now`.
///
/// If midnight is skipped by a DST transition, the first instant that exists on that day is used.
pub fn next_local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let timezone = now.timezone();
    let tomorrow = now.date_naive().succ_opt().unwrap_or(NaiveDate::MAX);
    let midnight = tomorrow.and_time(NaiveTime::MIN);
    (0..=96)
        .map(|quarter| midnight + Duration::minutes(15 * quarter))
        .find_map(|local| timezone.from_local_datetime(&local).earliest())
        .unwrap_or_else(|| now.clone() + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Timelike};
    use chrono_tz::America::Sao_Paulo;

    use super::*;

    fn oslo_summer() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    #[test]
    fn test_next_midnight_mid_day() {
        let now = oslo_summer()
            .with_ymd_and_hms(2025, 9, 3, 14, 30, 12)
            .unwrap();
        let midnight = next_local_midnight(&now);
        assert_eq!(
            midnight,
            oslo_summer().with_ymd_and_hms(2025, 9, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_midnight_just_before_and_at_midnight() {
        let now = oslo_summer()
            .with_ymd_and_hms(2025, 12, 31, 23, 59, 59)
            .unwrap();
        assert_eq!(
            next_local_midnight(&now),
            oslo_summer().with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
        let now = oslo_summer().with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            next_local_midnight(&now),
            oslo_summer().with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap()
        );
    }

    /// Sao Paulo skipped from 00:00 to 01:00 on 2018-11-04.
    #[test]
    fn test_next_midnight_in_dst_gap() {
        let now = Sao_Paulo.with_ymd_and_hms(2018, 11, 3, 12, 0, 0).unwrap();
        let midnight = next_local_midnight(&now);
        assert_eq!(
            midnight,
            Sao_Paulo.with_ymd_and_hms(2018, 11, 4, 1, 0, 0).unwrap()
        );
        assert_eq!(midnight.naive_local().to_string(), "2018-11-04 01:00:00");
        assert_eq!(midnight - now, Duration::hours(12));
    }

    /// On the day clocks go back, midnight exists and the day is longer.
    #[test]
    fn test_next_midnight_before_dst_end() {
        let now = Sao_Paulo.with_ymd_and_hms(2019, 2, 16, 12, 0, 0).unwrap();
        let midnight = next_local_midnight(&now);
        assert_eq!(midnight.naive_local().to_string(), "2019-02-17 00:00:00");
        assert_eq!(midnight - now, Duration::hours(13));
    }

    #[test]
    fn test_next_midnight_local() {
        let now = Local.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let midnight = next_local_midnight(&now);
        assert_eq!(
            midnight.date_naive(),
            NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()
        );
        assert_eq!(midnight.hour(), 0);
        assert!(midnight > now);
    }

    #[test]
    fn test_manual_clock() {
        let start = Local.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        clock.advance(Duration::hours(12));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 11).unwrap());
    }
}
