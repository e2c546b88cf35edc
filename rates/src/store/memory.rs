//! In-memory rate store for testing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use ratewindow_common::{CurrencyCode, DayWindow, RateSeries};
use tracing::warn;

use super::{InsertReport, RateStore};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct Table {
    columns: BTreeSet<CurrencyCode>,
    rows: BTreeMap<NaiveDate, HashMap<CurrencyCode, f64>>,
}

/// Wide-table store held in memory.
///
/// Mirrors the Postgres layout (row per day, column per currency). Failure
/// switches: offline, failing reads, and one currency's writes rejected or
/// stalled.
pub struct MemoryRateStore {
    table: RwLock<Table>,
    online: AtomicBool,
    fail_reads: AtomicBool,
    column_adds: AtomicUsize,
    reject_writes: RwLock<Option<CurrencyCode>>,
    slow_writes: RwLock<Option<(CurrencyCode, Duration)>>,
}

impl MemoryRateStore {
    /// Create an empty, online store.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::default()),
            online: AtomicBool::new(true),
            fail_reads: AtomicBool::new(false),
            column_adds: AtomicUsize::new(0),
            reject_writes: RwLock::new(None),
            slow_writes: RwLock::new(None),
        }
    }

    /// Simulate losing or regaining the connection.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make rate reads hit a query error, as a bad column type or missing
    /// grant would.
    pub fn set_read_failure(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    /// Make writes of `currency` fail with a query error.
    pub fn reject_writes_for(&self, currency: Option<CurrencyCode>) {
        *self.reject_writes.write() = currency;
    }

    /// Hold every write of `currency` for `delay` before applying it.
    pub fn delay_writes_for(&self, currency: CurrencyCode, delay: Duration) {
        *self.slow_writes.write() = Some((currency, delay));
    }

    /// Number of columns ever added.
    pub fn column_additions(&self) -> usize {
        self.column_adds.load(Ordering::SeqCst)
    }

    /// Stored cell, ignoring the read window.
    pub fn cell(&self, day: NaiveDate, currency: &CurrencyCode) -> Option<f64> {
        self.table
            .read()
            .rows
            .get(&day)
            .and_then(|row| row.get(currency).copied())
    }

    /// Number of day rows.
    pub fn row_count(&self) -> usize {
        self.table.read().rows.len()
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Connectivity("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    fn name(&self) -> &str {
        "MEMORY"
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        self.check_online()
    }

    async fn get_rates(&self, currency: &CurrencyCode, window: &DayWindow) -> StoreResult<RateSeries> {
        self.check_online()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            let cause = StoreError::Query(format!("read of {currency} failed"));
            warn!(currency = %currency, error = %cause, "Rate read failed, serving no data");
            return Ok(RateSeries::new(currency.clone()));
        }

        let table = self.table.read();
        let mut series = RateSeries::new(currency.clone());
        for (day, row) in table.rows.range(window.first..=window.last) {
            if let Some(rate) = row.get(currency) {
                series.add_rate(*day, *rate);
            }
        }
        Ok(series)
    }

    async fn insert(&self, series: &[RateSeries]) -> StoreResult<InsertReport> {
        let mut report = InsertReport::default();

        for s in series.iter().filter(|s| !s.is_empty()) {
            if let Err(e) = self.check_online() {
                return Err(report.fail(s.currency.clone(), e));
            }
            if self.reject_writes.read().as_ref() == Some(&s.currency) {
                let cause = StoreError::Query(format!("write of {} rejected", s.currency));
                return Err(report.fail(s.currency.clone(), cause));
            }
            let stall = match &*self.slow_writes.read() {
                Some((slow, delay)) if *slow == s.currency => Some(*delay),
                _ => None,
            };
            if let Some(delay) = stall {
                tokio::time::sleep(delay).await;
            }

            // One write lock covers check-then-add and the cell writes.
            let mut table = self.table.write();
            if table.columns.insert(s.currency.clone()) {
                self.column_adds.fetch_add(1, Ordering::SeqCst);
                report.onboarded.push(s.currency.clone());
            }
            for (day, rate) in s.iter() {
                table.rows.entry(day).or_default().insert(s.currency.clone(), rate);
            }
            report.cells += s.len();
            report.written.push(s.currency.clone());
        }

        Ok(report)
    }

    async fn read_known_currencies(&self) -> StoreResult<BTreeSet<CurrencyCode>> {
        self.check_online()?;
        Ok(self.table.read().columns.clone())
    }
}
