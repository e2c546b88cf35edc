//! Rate pipeline configuration.

use std::time::Duration;

use ratewindow_common::DEFAULT_WINDOW_DAYS;

/// Published history of ECB euro reference rates.
pub const DEFAULT_SOURCE_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-hist.xml";

/// Wide table holding one row per day and one column per currency.
pub const DEFAULT_TABLE: &str = "exchange_rates";

/// Configuration for the fetch/parse/store pipeline and the rate cache.
#[derive(Debug, Clone)]
pub struct RatesConfig {
    /// URL of the rate history document.
    pub source_url: String,
    /// Number of most-recent days kept per currency.
    pub window_size: usize,
    /// Upper bound on one fetch of the source document.
    pub fetch_timeout: Duration,
    /// Upper bound on one store call.
    pub store_timeout: Duration,
    /// Maximum fetch and store calls running at once.
    pub max_concurrent_ops: usize,
    /// Name of the wide rate table.
    pub table: String,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            window_size: DEFAULT_WINDOW_DAYS,
            fetch_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            max_concurrent_ops: 10,
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl RatesConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RATEWINDOW_SOURCE_URL") {
            config.source_url = url;
        }

        if let Ok(size) = std::env::var("RATEWINDOW_WINDOW_SIZE") {
            if let Ok(size) = size.parse() {
                config.window_size = size;
            }
        }

        if let Ok(secs) = std::env::var("RATEWINDOW_FETCH_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.fetch_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(secs) = std::env::var("RATEWINDOW_STORE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.store_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(ops) = std::env::var("RATEWINDOW_MAX_CONCURRENT_OPS") {
            if let Ok(ops) = ops.parse() {
                config.max_concurrent_ops = ops;
            }
        }

        if let Ok(table) = std::env::var("RATEWINDOW_TABLE") {
            config.table = table;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.source_url.is_empty() {
            return Err("Source URL cannot be empty".to_string());
        }

        if self.window_size == 0 {
            return Err("Window size must be at least one day".to_string());
        }

        if self.max_concurrent_ops == 0 {
            return Err("Max concurrent operations must be at least 1".to_string());
        }

        if self.fetch_timeout.is_zero() || self.store_timeout.is_zero() {
            return Err("Timeouts must be non-zero".to_string());
        }

        if !is_plain_identifier(&self.table) {
            return Err(format!("Table name {:?} is not a plain SQL identifier", self.table));
        }

        Ok(())
    }
}

/// Lowercase ASCII identifier that needs no quoting: `[a-z_][a-z0-9_]*`.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RatesConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 90);
        assert_eq!(config.max_concurrent_ops, 10);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = RatesConfig::default();
        config.window_size = 0;
        assert!(config.validate().is_err());

        let mut config = RatesConfig::default();
        config.max_concurrent_ops = 0;
        assert!(config.validate().is_err());

        let mut config = RatesConfig::default();
        config.source_url.clear();
        assert!(config.validate().is_err());

        let mut config = RatesConfig::default();
        config.store_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_table_name_must_be_plain() {
        let mut config = RatesConfig::default();
        for bad in ["", "Rates", "1rates", "rates; drop", "rates-x"] {
            config.table = bad.to_string();
            assert!(config.validate().is_err(), "{bad:?} should be rejected");
        }
        config.table = "fx_rates_v2".to_string();
        assert!(config.validate().is_ok());
    }
}
