//! Node configuration.

use ratewindow_rates::RatesConfig;

/// Main node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Database URL.
    pub database_url: String,
    /// Maximum pooled database connections.
    pub max_connections: u32,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Rate pipeline configuration.
    pub rates: RatesConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/ratewindow".to_string(),
            max_connections: 5,
            log_level: "info".to_string(),
            rates: RatesConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            rates: RatesConfig::from_env(),
            ..Self::default()
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(max) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.max_connections = max;
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }

        self.rates.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = NodeConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.rates.table = "rates; DROP TABLE users".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_defaults() {
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "12");
        std::env::set_var("RATEWINDOW_WINDOW_SIZE", "30");
        std::env::set_var("LOG_LEVEL", "debug");

        let config = NodeConfig::from_env();

        std::env::remove_var("DATABASE_MAX_CONNECTIONS");
        std::env::remove_var("RATEWINDOW_WINDOW_SIZE");
        std::env::remove_var("LOG_LEVEL");

        assert_eq!(config.max_connections, 12);
        assert_eq!(config.rates.window_size, 30);
        assert_eq!(config.log_level, "debug");
        assert!(config.validate().is_ok());
    }
}
