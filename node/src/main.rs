//! ratewindow binary
//!
//! Runs one cache operation against Postgres and prints its JSON result.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratewindow_node::{commands, Cli, NodeConfig};
use ratewindow_rates::{EcbSource, PgRateStore, RateCache, RateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let source = EcbSource::new(&config.rates.source_url, config.rates.fetch_timeout)?;
    let store = Arc::new(
        PgRateStore::connect(
            &config.database_url,
            config.max_connections,
            config.rates.store_timeout,
            &config.rates.table,
        )
        .await?,
    );
    store.ensure_schema().await?;

    let cache = RateCache::new(Arc::new(source), store.clone(), config.rates.clone());

    info!(command = ?cli.command, table = %config.rates.table, "Running command");

    let output = tokio::select! {
        result = commands::execute(&cli.command, &cache, store.as_ref()) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received");
            cache.shutdown();
            return Err(anyhow::anyhow!("Interrupted"));
        }
    };

    match output {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}
