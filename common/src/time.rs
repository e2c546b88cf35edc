//! Day arithmetic for the trailing rate window.
//!
//! Rates are day-granular. A day is stored as the epoch-millisecond instant of
//! local midnight, and the served window always ends at the local "today".

use chrono::{DateTime, Days, Local, NaiveDate, TimeZone, Utc};

/// Default number of most-recent days retained per currency.
pub const DEFAULT_WINDOW_DAYS: usize = 90;

/// Textual day pattern used by the source document (`yyyy-M-dd`).
pub const SOURCE_DAY_FORMAT: &str = "%Y-%m-%d";

/// The day used when a source date cannot be parsed.
pub fn epoch_day() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

/// Current local calendar day.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a source day attribute such as `2024-1-02` or `2024-01-02`.
pub fn parse_source_day(text: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(text.trim(), SOURCE_DAY_FORMAT)
}

/// Epoch milliseconds of local midnight on `day`.
///
/// Zones whose clocks skip midnight on a transition day use the first
/// valid local instant of that day instead.
pub fn day_to_epoch_millis(day: NaiveDate) -> i64 {
    (0..=2)
        .find_map(|hour| {
            day.and_hms_opt(hour, 0, 0)?
                .and_local_timezone(Local)
                .earliest()
        })
        .map(|instant| instant.timestamp_millis())
        .unwrap_or_else(|| day.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis())
}

/// Local calendar day containing the given epoch-millisecond instant.
pub fn epoch_millis_to_day(millis: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|instant| instant.date_naive())
}

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    /// First day in the window.
    pub first: NaiveDate,
    /// Last day in the window.
    pub last: NaiveDate,
}

impl DayWindow {
    /// The `days` calendar days ending at (and including) `end`.
    pub fn trailing(end: NaiveDate, days: usize) -> Self {
        let back = days.saturating_sub(1) as u64;
        let first = end.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
        Self { first, last: end }
    }

    /// The `days` calendar days ending today.
    pub fn ending_today(days: usize) -> Self {
        Self::trailing(today(), days)
    }

    /// Check whether `day` falls inside the window.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.first <= day && day <= self.last
    }

    /// Row-key bounds of the window, both inclusive.
    pub fn millis_bounds(&self) -> (i64, i64) {
        (day_to_epoch_millis(self.first), day_to_epoch_millis(self.last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_source_day() {
        assert_eq!(parse_source_day("2024-01-02").unwrap(), day(2024, 1, 2));
        assert_eq!(parse_source_day("2024-1-02").unwrap(), day(2024, 1, 2));
        assert!(parse_source_day("02/01/2024").is_err());
        assert!(parse_source_day("").is_err());
    }

    #[test]
    fn test_epoch_millis_round_trip() {
        for d in [day(2024, 1, 1), day(2024, 3, 31), day(2024, 10, 27), day(1999, 12, 31)] {
            let millis = day_to_epoch_millis(d);
            assert_eq!(epoch_millis_to_day(millis), Some(d));
        }
    }

    #[test]
    fn test_epoch_millis_is_monotonic() {
        let a = day_to_epoch_millis(day(2024, 1, 1));
        let b = day_to_epoch_millis(day(2024, 1, 2));
        assert!(a < b);
    }

    #[test]
    fn test_trailing_window() {
        let window = DayWindow::trailing(day(2024, 3, 31), 90);
        assert_eq!(window.first, day(2024, 1, 2));
        assert!(window.contains(day(2024, 1, 2)));
        assert!(window.contains(day(2024, 3, 31)));
        assert!(!window.contains(day(2024, 1, 1)));
        assert!(!window.contains(day(2024, 4, 1)));
        assert_eq!((window.last - window.first).num_days() + 1, 90);
    }

    #[test]
    fn test_single_day_window() {
        let window = DayWindow::trailing(day(2024, 5, 5), 1);
        assert_eq!(window.first, window.last);
        let (lo, hi) = window.millis_bounds();
        assert_eq!(lo, hi);
    }
}
