//! Rate pipeline error types.
//!
//! Every error here is `Clone`: a de-duplicated refresh hands one outcome to
//! every caller waiting on it.

use chrono::NaiveDate;
use ratewindow_common::CurrencyCode;
use thiserror::Error;

/// Failure retrieving the source document.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network failure, connect or read timeout.
    #[error("Request to {url} failed: {cause}")]
    Request { url: String, cause: String },

    /// The source answered with a non-success status.
    #[error("Source {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body is not the expected XML tree.
    #[error("Malformed source document from {url}: {cause}")]
    Malformed { url: String, cause: String },
}

impl FetchError {
    pub(crate) fn request(url: &str, err: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            cause: err.to_string(),
        }
    }
}

/// Problem with a single cell of the source document.
///
/// Parse errors never abort a parse: the cell is skipped and the rest of the
/// document is kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Rate text is not a finite decimal number.
    #[error("Invalid rate {text:?} for {currency} on {day}")]
    InvalidRate {
        currency: CurrencyCode,
        day: NaiveDate,
        text: String,
    },

    /// Currency attribute is not a usable currency code.
    #[error("Invalid currency code {text:?} on {day}")]
    InvalidCurrency { day: NaiveDate, text: String },
}

/// Failure talking to the rate store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Connectivity(String),

    /// Adding the column for a new currency failed.
    #[error("Failed to add column for {currency}: {cause}")]
    Schema { currency: CurrencyCode, cause: String },

    /// A statement was rejected for a reason other than connectivity.
    #[error("Store query failed: {0}")]
    Query(String),

    /// A single store call did not finish in time.
    #[error("Store call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// A batch insert stopped part-way through.
    #[error("Insert stopped at {failed} after writing {} series: {cause}", applied.len())]
    PartialWrite {
        applied: Vec<CurrencyCode>,
        failed: CurrencyCode,
        cause: Box<StoreError>,
    },
}

impl StoreError {
    /// Check whether the error means the store could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Connectivity(_) => true,
            StoreError::PartialWrite { cause, .. } => cause.is_connectivity(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let connectivity = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => true,
            sqlx::Error::Database(db) => db.code().is_some_and(|code| is_connection_sqlstate(&code)),
            _ => false,
        };

        if connectivity {
            StoreError::Connectivity(err.to_string())
        } else {
            StoreError::Query(err.to_string())
        }
    }
}

/// SQLSTATEs reporting a lost connection or a server going away: class `08`
/// and the `57P01`..`57P03` shutdown codes.
fn is_connection_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

/// Errors surfaced by the rate cache.
#[derive(Debug, Clone, Error)]
pub enum RatesError {
    /// Fetching the source document failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The store rejected or could not serve the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A fetch or store call did not finish in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// The cache no longer admits work.
    #[error("Rate cache is shut down")]
    ShutDown,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for cache operations.
pub type RatesResult<T> = Result<T, RatesError>;
