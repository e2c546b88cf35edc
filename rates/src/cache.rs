//! Refresh-on-miss rate cache.
//!
//! Reads go straight to the store. A currency with no stored rates triggers a
//! full refresh (fetch, parse, insert) and is read again. Refreshes are keyed
//! by scope, either one currency or all of them, and concurrent requests for
//! the same scope share one in-flight operation and its single outcome.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use ratewindow_common::{CurrencyCode, DayWindow, RateSeries};
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, instrument, Instrument};
use uuid::Uuid;

use crate::config::RatesConfig;
use crate::error::{RatesError, RatesResult, StoreError};
use crate::parser;
use crate::source::RateSource;
use crate::store::{InsertReport, RateStore};

/// What a refresh covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshScope {
    /// Every currency in the source document.
    All,
    /// A single currency.
    Currency(CurrencyCode),
}

impl fmt::Display for RefreshScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshScope::All => f.write_str("ALL"),
            RefreshScope::Currency(code) => write!(f, "{code}"),
        }
    }
}

/// Result of a completed refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    pub scope: RefreshScope,
    /// Day nodes read from the document.
    pub days_read: usize,
    /// Currencies written to the store.
    pub currencies: Vec<CurrencyCode>,
    /// Cells written to the store.
    pub cells: usize,
    /// Currencies that got a new column.
    pub onboarded: Vec<CurrencyCode>,
    /// Cells dropped by the parser.
    pub skipped_cells: usize,
}

type SharedRefresh = Shared<BoxFuture<'static, RatesResult<RefreshSummary>>>;

struct Inner {
    source: Arc<dyn RateSource>,
    store: Arc<dyn RateStore>,
    config: RatesConfig,
    permits: Semaphore,
    in_flight: Mutex<HashMap<RefreshScope, WeakShared<BoxFuture<'static, RatesResult<RefreshSummary>>>>>,
}

/// Rate cache over a source and a store.
///
/// Cheap to clone; clones share the same in-flight registry.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<Inner>,
}

impl RateCache {
    /// Create a cache reading from `store` and refreshing from `source`.
    pub fn new(source: Arc<dyn RateSource>, store: Arc<dyn RateStore>, config: RatesConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_ops);
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                config,
                permits,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Rates for `currency` over the trailing window.
    ///
    /// A currency with no stored rates triggers a full refresh first. If the
    /// source has nothing for it either, the empty series is returned.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn get(&self, currency: &CurrencyCode) -> RatesResult<RateSeries> {
        let series = self.inner.read(currency).await?;
        if !series.is_empty() {
            debug!(days = series.len(), "Cache hit");
            return Ok(series);
        }

        debug!("Cache miss, refreshing all currencies");
        self.refresh_all().await?;
        self.inner.read(currency).await
    }

    /// Fetch and store rates for one currency.
    ///
    /// A currency the source does not publish is a successful no-op.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn refresh(&self, currency: &CurrencyCode) -> RatesResult<RefreshSummary> {
        self.run(RefreshScope::Currency(currency.clone())).await
    }

    /// Fetch and store rates for every currency in the source.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> RatesResult<RefreshSummary> {
        self.run(RefreshScope::All).await
    }

    /// Known currencies, sorted by code.
    pub async fn get_currencies(&self) -> RatesResult<Vec<CurrencyCode>> {
        let limit = self.inner.config.store_timeout;
        let known = self
            .inner
            .bounded("read known currencies", limit, self.inner.store.read_known_currencies())
            .await?;
        Ok(known.into_iter().collect())
    }

    /// Number of refreshes currently running.
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .values()
            .filter(|weak| weak.upgrade().is_some())
            .count()
    }

    /// Stop admitting work. Queued and later calls fail with
    /// [`RatesError::ShutDown`]; calls already running finish.
    pub fn shutdown(&self) {
        self.inner.permits.close();
        info!("Rate cache shut down");
    }

    /// Join the refresh in flight for `scope`, or start one.
    async fn run(&self, scope: RefreshScope) -> RatesResult<RefreshSummary> {
        let refresh: SharedRefresh = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&scope).and_then(WeakShared::upgrade) {
                Some(existing) => {
                    debug!(scope = %scope, "Joining in-flight refresh");
                    existing
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let key = scope.clone();
                    let refresh = async move {
                        let outcome = inner.refresh(&key).await;
                        inner.in_flight.lock().remove(&key);
                        outcome
                    }
                    .boxed()
                    .shared();

                    if let Some(weak) = refresh.downgrade() {
                        in_flight.insert(scope, weak);
                    }
                    refresh
                }
            }
        };

        refresh.await
    }
}

impl Inner {
    async fn read(&self, currency: &CurrencyCode) -> RatesResult<RateSeries> {
        let window = DayWindow::ending_today(self.config.window_size);
        self.bounded(
            "read rates",
            self.config.store_timeout,
            self.store.get_rates(currency, &window),
        )
        .await
    }

    async fn refresh(&self, scope: &RefreshScope) -> RatesResult<RefreshSummary> {
        let span = info_span!("refresh", op = %Uuid::now_v7(), scope = %scope);

        async {
            let document = self
                .bounded("fetch", self.config.fetch_timeout, self.source.fetch())
                .await?;

            let filter = match scope {
                RefreshScope::All => None,
                RefreshScope::Currency(code) => Some(code),
            };
            let parsed = parser::parse(&document, filter, self.config.window_size);

            let mut summary = RefreshSummary {
                scope: scope.clone(),
                days_read: parsed.days_read,
                currencies: Vec::new(),
                cells: 0,
                onboarded: Vec::new(),
                skipped_cells: parsed.skipped.len(),
            };

            if parsed.series.is_empty() {
                info!(days = parsed.days_read, "Source has no rates for scope");
                return Ok(summary);
            }

            let report = self.insert_all(&parsed.series).await?;

            summary.currencies = report.written;
            summary.cells = report.cells;
            summary.onboarded = report.onboarded;

            info!(
                source = self.source.name(),
                days = summary.days_read,
                currencies = summary.currencies.len(),
                cells = summary.cells,
                onboarded = summary.onboarded.len(),
                skipped = summary.skipped_cells,
                "Refresh complete"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Write `series` one currency at a time under a single worker permit.
    ///
    /// Each currency gets its own time limit, so a stall part-way reports the
    /// currencies already written as a partial write.
    async fn insert_all(&self, series: &[RateSeries]) -> RatesResult<InsertReport> {
        let _permit = self.permits.acquire().await.map_err(|_| RatesError::ShutDown)?;
        let limit = self.config.store_timeout;
        let mut report = InsertReport::default();

        for s in series {
            let outcome = match tokio::time::timeout(limit, self.store.insert(std::slice::from_ref(s))).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StoreError::Timeout {
                    after_ms: millis(limit),
                }),
            };
            match outcome {
                Ok(written) => report.absorb(written),
                Err(e) => return Err(report.fail(s.currency.clone(), e).into()),
            }
        }

        Ok(report)
    }

    /// Run a backend call under a worker permit and a time limit.
    async fn bounded<T, E>(
        &self,
        operation: &'static str,
        limit: Duration,
        call: impl Future<Output = Result<T, E>>,
    ) -> RatesResult<T>
    where
        RatesError: From<E>,
    {
        let _permit = self.permits.acquire().await.map_err(|_| RatesError::ShutDown)?;

        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(RatesError::from),
            Err(_) => Err(RatesError::Timeout {
                operation,
                after_ms: millis(limit),
            }),
        }
    }
}

fn millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}
