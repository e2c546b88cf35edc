//! Rate storage.
//!
//! Rates live in one wide table: a row per day, a column per currency. The
//! set of columns is the set of known currencies and only ever grows; a
//! currency's column is added the first time a series for it is inserted.

use std::collections::BTreeSet;

use async_trait::async_trait;
use ratewindow_common::{CurrencyCode, DayWindow, RateSeries};

use crate::error::{StoreError, StoreResult};

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRateStore;
pub use postgres::PgRateStore;

/// Outcome of an insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Currencies whose series were written, in write order.
    pub written: Vec<CurrencyCode>,
    /// Total cells written.
    pub cells: usize,
    /// Currencies that received a new column during this insert.
    pub onboarded: Vec<CurrencyCode>,
}

impl InsertReport {
    /// Fold the report of a later insert into this one.
    pub fn absorb(&mut self, other: InsertReport) {
        self.written.extend(other.written);
        self.cells += other.cells;
        self.onboarded.extend(other.onboarded);
    }

    /// Turn a failure on `failed` into the error for the whole batch.
    ///
    /// Nothing written yet means the cause is returned as is; otherwise the
    /// caller learns which series already landed.
    pub fn fail(self, failed: CurrencyCode, cause: StoreError) -> StoreError {
        if self.written.is_empty() {
            cause
        } else {
            StoreError::PartialWrite {
                applied: self.written,
                failed,
                cause: Box::new(cause),
            }
        }
    }
}

/// Trait for rate stores.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Get the store name.
    fn name(&self) -> &str;

    /// Create the rate table if it does not exist.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// Rates for `currency` on the days inside `window`.
    ///
    /// A currency without a column, or without rows in the window, yields an
    /// empty series, as does a read the store rejects. Only a failure to reach
    /// the store is an error.
    async fn get_rates(&self, currency: &CurrencyCode, window: &DayWindow) -> StoreResult<RateSeries>;

    /// Write every `(day, rate)` of every series, adding columns for unseen
    /// currencies first.
    ///
    /// Re-inserting the same series leaves the store unchanged. The batch is
    /// not atomic across currencies; a failure part-way is reported as
    /// [`StoreError::PartialWrite`].
    async fn insert(&self, series: &[RateSeries]) -> StoreResult<InsertReport>;

    /// Currencies that currently have a column. Always read from the schema.
    async fn read_known_currencies(&self) -> StoreResult<BTreeSet<CurrencyCode>>;
}
