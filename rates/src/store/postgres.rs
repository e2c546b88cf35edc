//! Postgres-backed rate store.
//!
//! Row key `day` is the epoch-millisecond instant of local midnight. Currency
//! columns are `DOUBLE PRECISION` and named by the quoted, uppercase currency
//! code. [`CurrencyCode`] only admits three ASCII letters and the table name
//! is validated by `RatesConfig::validate`, so both are safe to splice into
//! statements.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ratewindow_common::{day_to_epoch_millis, epoch_millis_to_day, CurrencyCode, DayWindow, RateSeries};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{InsertReport, RateStore};
use crate::error::{StoreError, StoreResult};

const UNDEFINED_COLUMN: &str = "42703";
const UNDEFINED_TABLE: &str = "42P01";

/// Rate store on a Postgres wide table.
pub struct PgRateStore {
    pool: PgPool,
    table: String,
    /// Per-currency guard around the check-then-add column sequence.
    onboarding: DashMap<CurrencyCode, Arc<Mutex<()>>>,
}

impl PgRateStore {
    /// Create a store on an existing pool.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
            onboarding: DashMap::new(),
        }
    }

    /// Open a pool to `database_url` and create a store on it.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        table: impl Into<String>,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;

        Ok(Self::new(pool, table))
    }

    /// Add the column for `currency` unless it already exists.
    ///
    /// Returns whether this call added it.
    async fn ensure_column(&self, currency: &CurrencyCode, known: &BTreeSet<CurrencyCode>) -> StoreResult<bool> {
        if known.contains(currency) {
            return Ok(false);
        }

        let guard = self.onboarding.entry(currency.clone()).or_default().clone();
        let _held = guard.lock().await;

        // Another insert may have added it while we waited.
        if self.column_exists(currency).await? {
            return Ok(false);
        }

        let sql = format!(
            r#"ALTER TABLE {} ADD COLUMN IF NOT EXISTS "{}" DOUBLE PRECISION"#,
            self.table, currency
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::Connectivity(cause) => StoreError::Connectivity(cause),
                other => StoreError::Schema {
                    currency: currency.clone(),
                    cause: other.to_string(),
                },
            })?;

        info!(table = %self.table, currency = %currency, "Added currency column");
        Ok(true)
    }

    async fn column_exists(&self, currency: &CurrencyCode) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2)",
        )
        .bind(&self.table)
        .bind(currency.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Upsert every cell of `series` in one statement.
    async fn write_series(&self, series: &RateSeries) -> StoreResult<usize> {
        let (days, rates): (Vec<i64>, Vec<f64>) = series
            .iter()
            .map(|(day, rate)| (day_to_epoch_millis(day), rate))
            .unzip();

        let sql = format!(
            r#"INSERT INTO {table} (day, "{col}")
               SELECT * FROM UNNEST($1::BIGINT[], $2::DOUBLE PRECISION[])
               ON CONFLICT (day) DO UPDATE SET "{col}" = EXCLUDED."{col}""#,
            table = self.table,
            col = series.currency
        );

        let result = sqlx::query(&sql).bind(days).bind(rates).execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    fn name(&self) -> &str {
        "POSTGRES"
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let sql = format!("CREATE TABLE IF NOT EXISTS {} (day BIGINT PRIMARY KEY)", self.table);
        sqlx::query(&sql).execute(&self.pool).await?;
        debug!(table = %self.table, "Rate table ready");
        Ok(())
    }

    async fn get_rates(&self, currency: &CurrencyCode, window: &DayWindow) -> StoreResult<RateSeries> {
        let (from, to) = window.millis_bounds();
        let sql = format!(
            r#"SELECT day, "{col}" FROM {table} WHERE day BETWEEN $1 AND $2 AND "{col}" IS NOT NULL"#,
            table = self.table,
            col = currency
        );

        let rows = match sqlx::query(&sql).bind(from).bind(to).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(sqlx::Error::Database(db))
                if matches!(db.code().as_deref(), Some(UNDEFINED_COLUMN) | Some(UNDEFINED_TABLE)) =>
            {
                debug!(currency = %currency, "No column for currency");
                return Ok(RateSeries::new(currency.clone()));
            }
            Err(e) => match StoreError::from(e) {
                StoreError::Connectivity(cause) => return Err(StoreError::Connectivity(cause)),
                other => {
                    warn!(currency = %currency, error = %other, "Rate read failed, serving no data");
                    return Ok(RateSeries::new(currency.clone()));
                }
            },
        };

        let mut series = RateSeries::new(currency.clone());
        for row in rows {
            let cell = row
                .try_get::<i64, _>(0)
                .and_then(|day| Ok((day, row.try_get::<f64, _>(1)?)));
            match cell {
                Ok((millis, rate)) => match epoch_millis_to_day(millis) {
                    Some(day) if window.contains(day) => series.add_rate(day, rate),
                    _ => debug!(currency = %currency, day = millis, "Row outside window"),
                },
                Err(e) => warn!(currency = %currency, error = %e, "Skipping unreadable cell"),
            }
        }

        Ok(series)
    }

    async fn insert(&self, series: &[RateSeries]) -> StoreResult<InsertReport> {
        let known = self.read_known_currencies().await?;
        let mut report = InsertReport::default();

        for s in series.iter().filter(|s| !s.is_empty()) {
            let onboarded = match self.ensure_column(&s.currency, &known).await {
                Ok(added) => added,
                Err(e) => return Err(report.fail(s.currency.clone(), e)),
            };
            if onboarded {
                report.onboarded.push(s.currency.clone());
            }

            match self.write_series(s).await {
                Ok(cells) => {
                    report.cells += cells;
                    report.written.push(s.currency.clone());
                }
                Err(e) => return Err(report.fail(s.currency.clone(), e)),
            }
        }

        debug!(
            table = %self.table,
            series = report.written.len(),
            cells = report.cells,
            "Inserted rates"
        );
        Ok(report)
    }

    async fn read_known_currencies(&self) -> StoreResult<BTreeSet<CurrencyCode>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name <> 'day'",
        )
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await?;

        Ok(names
            .into_iter()
            .filter_map(|name| match CurrencyCode::parse(&name) {
                Ok(code) if code.as_str() == name => Some(code),
                _ => {
                    warn!(table = %self.table, column = %name, "Ignoring non-currency column");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DATABASE_ENV: &str = "RATEWINDOW_TEST_DATABASE_URL";

    /// Store on a freshly created `table` in the database named by
    /// `RATEWINDOW_TEST_DATABASE_URL`.
    async fn live_store(table: &str) -> PgRateStore {
        let url = std::env::var(TEST_DATABASE_ENV)
            .unwrap_or_else(|_| panic!("{TEST_DATABASE_ENV} must point at a scratch database"));
        let store = PgRateStore::connect(&url, 4, Duration::from_secs(5), table)
            .await
            .unwrap();

        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&store.pool)
            .await
            .unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "needs RATEWINDOW_TEST_DATABASE_URL"]
    async fn test_live_round_trip() {
        let store = live_store("exchange_rates_round_trip").await;

        let usd = CurrencyCode::parse("USD").unwrap();
        let today = ratewindow_common::today();
        let mut series = RateSeries::new(usd.clone());
        series.add_rate(today, 1.0956);

        let first = store.insert(std::slice::from_ref(&series)).await.unwrap();
        let second = store.insert(std::slice::from_ref(&series)).await.unwrap();
        assert_eq!(first.onboarded, vec![usd.clone()]);
        assert!(second.onboarded.is_empty());

        let window = DayWindow::ending_today(90);
        let read = store.get_rates(&usd, &window).await.unwrap();
        assert_eq!(read.rate_on(today), Some(1.0956));
        assert!(store.read_known_currencies().await.unwrap().contains(&usd));

        let unknown = CurrencyCode::parse("CHF").unwrap();
        assert!(store.get_rates(&unknown, &window).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs RATEWINDOW_TEST_DATABASE_URL"]
    async fn test_live_concurrent_onboarding_adds_one_column() {
        let store = Arc::new(live_store("exchange_rates_onboarding").await);

        let nok = CurrencyCode::parse("NOK").unwrap();
        let mut series = RateSeries::new(nok.clone());
        series.add_rate(ratewindow_common::today(), 11.52);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let series = series.clone();
                tokio::spawn(async move { store.insert(std::slice::from_ref(&series)).await })
            })
            .collect();

        let mut onboarded = 0;
        for handle in handles {
            let report = handle.await.unwrap().unwrap();
            assert_eq!(report.written, vec![nok.clone()]);
            onboarded += report.onboarded.len();
        }

        assert_eq!(onboarded, 1);
        let known = store.read_known_currencies().await.unwrap();
        assert_eq!(known.into_iter().collect::<Vec<_>>(), vec![nok]);
    }

    #[tokio::test]
    #[ignore = "needs RATEWINDOW_TEST_DATABASE_URL"]
    async fn test_live_failed_read_serves_no_data() {
        let store = live_store("exchange_rates_bad_column").await;

        // A text column named like a currency fails the f64 decode of every row.
        sqlx::query(r#"ALTER TABLE exchange_rates_bad_column ADD COLUMN "SEK" TEXT"#)
            .execute(&store.pool)
            .await
            .unwrap();
        let millis = ratewindow_common::day_to_epoch_millis(ratewindow_common::today());
        sqlx::query(r#"INSERT INTO exchange_rates_bad_column (day, "SEK") VALUES ($1, 'n/a')"#)
            .bind(millis)
            .execute(&store.pool)
            .await
            .unwrap();

        let sek = CurrencyCode::parse("SEK").unwrap();
        let read = store.get_rates(&sek, &DayWindow::ending_today(90)).await.unwrap();
        assert!(read.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connectivity_error() {
        let result = PgRateStore::connect(
            "postgres://ratewindow@127.0.0.1:1/ratewindow",
            1,
            Duration::from_millis(200),
            "exchange_rates",
        )
        .await;

        assert!(matches!(result, Err(StoreError::Connectivity(_))));
    }
}
