//! ratewindow rate pipeline
//!
//! Keeps a trailing window of daily euro reference rates per currency.
//!
//! # Features
//!
//! - Fetch of the published rate history over HTTP
//! - Tolerant parsing that skips bad cells instead of failing the document
//! - Wide-table storage with currency columns added on first sight
//! - Refresh-on-miss cache sharing one refresh between concurrent callers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratewindow_rates::{EcbSource, PgRateStore, RateCache, RatesConfig};
//!
//! let config = RatesConfig::from_env();
//! let source = EcbSource::new(&config.source_url, config.fetch_timeout)?;
//! let store = PgRateStore::connect(&database_url, 5, config.store_timeout, &config.table).await?;
//! let cache = RateCache::new(Arc::new(source), Arc::new(store), config);
//!
//! let usd = cache.get(&"USD".parse()?).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod parser;
pub mod source;
pub mod store;
pub mod view;

pub use cache::{RateCache, RefreshScope, RefreshSummary};
pub use config::RatesConfig;
pub use error::{FetchError, ParseError, RatesError, RatesResult, StoreError, StoreResult};
pub use parser::{parse, ParsedRates};
pub use source::{EcbSource, RateSource, SourceDocument};
pub use store::{InsertReport, PgRateStore, RateStore};
pub use view::{CurrencyList, RateChart};

#[cfg(any(test, feature = "test-utils"))]
pub use source::StaticSource;
#[cfg(any(test, feature = "test-utils"))]
pub use store::MemoryRateStore;
