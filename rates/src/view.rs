//! JSON shapes served to presentation adapters.

use ratewindow_common::{CurrencyCode, RateSeries};
use serde::{Deserialize, Serialize};

/// Chart-ready view of a rate series.
///
/// `dates` are epoch milliseconds at local midnight in ascending order and
/// `rates[i]` is the rate on `dates[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateChart {
    pub dates: Vec<i64>,
    pub rates: Vec<f64>,
}

impl From<&RateSeries> for RateChart {
    fn from(series: &RateSeries) -> Self {
        let (dates, rates) = series.epoch_points().into_iter().unzip();
        Self { dates, rates }
    }
}

/// Known currencies as plain codes, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyList {
    pub currencies: Vec<String>,
}

impl FromIterator<CurrencyCode> for CurrencyList {
    fn from_iter<I: IntoIterator<Item = CurrencyCode>>(iter: I) -> Self {
        let mut currencies: Vec<String> = iter.into_iter().map(String::from).collect();
        currencies.sort();
        currencies.dedup();
        Self { currencies }
    }
}
