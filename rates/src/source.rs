//! Rate history sources.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Rate history document as published by the source.
///
/// ```xml
/// <gesmes:Envelope ...>
///   <Cube>
///     <Cube time="2024-01-02">
///       <Cube currency="USD" rate="1.0956"/>
///     </Cube>
///   </Cube>
/// </gesmes:Envelope>
/// ```
///
/// Attribute values are kept as text; the parser decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceDocument {
    #[serde(rename = "Cube")]
    pub history: DaySequence,
}

/// Outer sequence of day nodes, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DaySequence {
    #[serde(rename = "Cube", default)]
    pub days: Vec<DayNode>,
}

/// One published day.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DayNode {
    #[serde(rename = "@time", default)]
    pub time: String,
    #[serde(rename = "Cube", default)]
    pub rates: Vec<RateNode>,
}

/// One currency's rate on a day.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RateNode {
    #[serde(rename = "@currency", default)]
    pub currency: String,
    #[serde(rename = "@rate", default)]
    pub rate: String,
}

impl SourceDocument {
    /// Build a document from day nodes in document order.
    pub fn new(days: Vec<DayNode>) -> Self {
        Self {
            history: DaySequence { days },
        }
    }

    /// Deserialize a document from XML text.
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }

    /// Day nodes in document order.
    pub fn days(&self) -> &[DayNode] {
        &self.history.days
    }
}

impl DayNode {
    /// Build a day node from `(currency, rate)` text pairs.
    pub fn new<'a>(time: &str, rates: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            time: time.to_string(),
            rates: rates
                .into_iter()
                .map(|(currency, rate)| RateNode {
                    currency: currency.to_string(),
                    rate: rate.to_string(),
                })
                .collect(),
        }
    }
}

/// Trait for rate history sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Retrieve the full history document.
    async fn fetch(&self) -> Result<SourceDocument, FetchError>;
}

/// ECB reference-rate history over HTTP.
pub struct EcbSource {
    client: Client,
    url: String,
}

impl EcbSource {
    /// Create a source for `url` whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ratewindow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::request(&url, e))?;

        Ok(Self { client, url })
    }

    /// URL this source fetches.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RateSource for EcbSource {
    fn name(&self) -> &str {
        "ECB"
    }

    async fn fetch(&self) -> Result<SourceDocument, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::request(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::request(&self.url, e))?;

        let document = SourceDocument::from_xml(&body).map_err(|e| FetchError::Malformed {
            url: self.url.clone(),
            cause: e.to_string(),
        })?;

        debug!(
            source = self.name(),
            bytes = body.len(),
            days = document.days().len(),
            "Fetched rate history"
        );

        Ok(document)
    }
}

/// Fixed source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct StaticSource {
    outcome: parking_lot::Mutex<Result<SourceDocument, FetchError>>,
    delay: parking_lot::Mutex<Option<Duration>>,
    fetches: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticSource {
    /// Source that always returns `document`.
    pub fn new(document: SourceDocument) -> Self {
        Self {
            outcome: parking_lot::Mutex::new(Ok(document)),
            delay: parking_lot::Mutex::new(None),
            fetches: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Source that always fails with `error`.
    pub fn failing(error: FetchError) -> Self {
        let source = Self::new(SourceDocument::default());
        source.set_failure(error);
        source
    }

    /// Make later fetches fail.
    pub fn set_failure(&self, error: FetchError) {
        *self.outcome.lock() = Err(error);
    }

    /// Hold every fetch for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for StaticSource {
    fn name(&self) -> &str {
        "STATIC"
    }

    async fn fetch(&self) -> Result<SourceDocument, FetchError> {
        self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.lock().clone()
    }
}
