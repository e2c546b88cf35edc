//! Source document parsing.
//!
//! Turns a [`SourceDocument`] into one [`RateSeries`] per currency, limited to
//! the first `window_size` day nodes. The document is assumed to list days
//! most recent first; that order is not re-checked. Parsing is tolerant: a bad
//! date degrades to the epoch day and a bad cell is skipped, but neither stops
//! the rest of the document from being read.

use std::collections::BTreeMap;

use ratewindow_common::{epoch_day, parse_source_day, CurrencyCode, RateSeries};
use tracing::warn;

use crate::error::ParseError;
use crate::source::SourceDocument;

/// Output of a parse.
#[derive(Debug, Clone, Default)]
pub struct ParsedRates {
    /// One series per currency, ordered by currency code.
    pub series: Vec<RateSeries>,
    /// Cells that were skipped.
    pub skipped: Vec<ParseError>,
    /// Day nodes consumed.
    pub days_read: usize,
}

impl ParsedRates {
    /// Total number of `(day, rate)` cells across all series.
    pub fn cell_count(&self) -> usize {
        self.series.iter().map(RateSeries::len).sum()
    }
}

/// Parse the first `window_size` days of `doc`.
///
/// With a `filter`, only that currency's cells are kept.
pub fn parse(doc: &SourceDocument, filter: Option<&CurrencyCode>, window_size: usize) -> ParsedRates {
    let mut by_currency: BTreeMap<CurrencyCode, RateSeries> = BTreeMap::new();
    let mut skipped = Vec::new();
    let mut days_read = 0;

    for node in doc.days().iter().take(window_size) {
        days_read += 1;

        let day = match parse_source_day(&node.time) {
            Ok(day) => day,
            Err(e) => {
                warn!(time = %node.time, error = %e, "Unparseable day, using epoch day");
                epoch_day()
            }
        };

        for cell in &node.rates {
            let currency = match CurrencyCode::parse(&cell.currency) {
                Ok(currency) => currency,
                Err(_) => {
                    if filter.is_none() {
                        let err = ParseError::InvalidCurrency {
                            day,
                            text: cell.currency.clone(),
                        };
                        warn!(error = %err, "Skipping cell");
                        skipped.push(err);
                    }
                    continue;
                }
            };

            if filter.is_some_and(|wanted| *wanted != currency) {
                continue;
            }

            let rate = match cell.rate.trim().parse::<f64>() {
                Ok(rate) if rate.is_finite() => rate,
                _ => {
                    let err = ParseError::InvalidRate {
                        currency,
                        day,
                        text: cell.rate.clone(),
                    };
                    warn!(error = %err, "Skipping cell");
                    skipped.push(err);
                    continue;
                }
            };

            by_currency
                .entry(currency.clone())
                .or_insert_with(|| RateSeries::new(currency))
                .add_rate(day, rate);
        }
    }

    ParsedRates {
        series: by_currency.into_values().collect(),
        skipped,
        days_read,
    }
}
