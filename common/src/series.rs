//! Per-currency rate series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::currency::CurrencyCode;
use crate::time::day_to_epoch_millis;

/// Observed daily rates for one currency, quoted against the base currency.
///
/// A day without a published rate is absent from `rates`; there are no null
/// cells. The map is ordered, so iteration is always chronological.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSeries {
    /// Currency the rates belong to.
    pub currency: CurrencyCode,
    /// Rate per day.
    pub rates: BTreeMap<NaiveDate, f64>,
}

impl RateSeries {
    /// Create an empty series.
    pub fn new(currency: CurrencyCode) -> Self {
        Self {
            currency,
            rates: BTreeMap::new(),
        }
    }

    /// Record the rate for a day, replacing any previous value.
    ///
    /// Non-finite values are not rates and are ignored.
    pub fn add_rate(&mut self, day: NaiveDate, rate: f64) {
        if rate.is_finite() {
            self.rates.insert(day, rate);
        }
    }

    /// Rate on a given day.
    pub fn rate_on(&self, day: NaiveDate) -> Option<f64> {
        self.rates.get(&day).copied()
    }

    /// Days in ascending order.
    pub fn sorted_dates(&self) -> Vec<NaiveDate> {
        self.rates.keys().copied().collect()
    }

    /// Iterate `(day, rate)` pairs in ascending day order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.rates.iter().map(|(day, rate)| (*day, *rate))
    }

    /// `(epoch_ms, rate)` pairs in ascending order, epoch ms at local midnight.
    pub fn epoch_points(&self) -> Vec<(i64, f64)> {
        self.iter()
            .map(|(day, rate)| (day_to_epoch_millis(day), rate))
            .collect()
    }

    /// Check if the series holds no rates.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Number of days with a rate.
    pub fn len(&self) -> usize {
        self.rates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("USD").unwrap()
    }

    #[test]
    fn test_sorted_dates_ascending() {
        let mut series = RateSeries::new(usd());
        series.add_rate(day(2024, 1, 3), 1.12);
        series.add_rate(day(2024, 1, 1), 1.09);
        series.add_rate(day(2024, 1, 2), 1.10);

        assert_eq!(
            series.sorted_dates(),
            vec![day(2024, 1, 1), day(2024, 1, 2), day(2024, 1, 3)]
        );
        assert_eq!(series.rate_on(day(2024, 1, 2)), Some(1.10));
    }

    #[test]
    fn test_non_finite_rates_are_ignored() {
        let mut series = RateSeries::new(usd());
        series.add_rate(day(2024, 1, 1), f64::NAN);
        series.add_rate(day(2024, 1, 2), f64::INFINITY);
        assert!(series.is_empty());
    }

    #[test]
    fn test_add_rate_overwrites_same_day() {
        let mut series = RateSeries::new(usd());
        series.add_rate(day(2024, 1, 1), 1.0);
        series.add_rate(day(2024, 1, 1), 2.0);
        assert_eq!(series.len(), 1);
        assert_eq!(series.rate_on(day(2024, 1, 1)), Some(2.0));
    }

    #[test]
    fn test_epoch_points_aligned() {
        let mut series = RateSeries::new(usd());
        series.add_rate(day(2024, 1, 2), 1.10);
        series.add_rate(day(2024, 1, 1), 1.09);

        let points = series.epoch_points();
        assert_eq!(points.len(), 2);
        assert!(points[0].0 < points[1].0);
        assert_eq!(points[0].1, 1.09);
        assert_eq!(points[1].1, 1.10);
    }
}
