//! Command-line commands.

use clap::{Parser, Subcommand};
use ratewindow_common::CurrencyCode;
use ratewindow_rates::{CurrencyList, RateCache, RateChart, RateStore, RefreshSummary};
use serde_json::{json, Value};
use tracing::info;

/// ratewindow CLI
#[derive(Parser, Debug)]
#[command(name = "ratewindow")]
#[command(about = "Trailing window of ECB euro reference rates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed to the command line.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List currencies with stored rates
    Currencies,

    /// Print the rate chart for a currency, refreshing on a miss
    Get {
        /// ISO 4217 code, case-insensitive
        code: CurrencyCode,
    },

    /// Fetch and store rates for one currency
    Refresh {
        /// ISO 4217 code, case-insensitive
        code: CurrencyCode,
    },

    /// Fetch and store rates for every published currency
    RefreshAll,

    /// Create the rate table if it does not exist
    InitSchema,
}

/// Run `command` and return its JSON output.
pub async fn execute(command: &Command, cache: &RateCache, store: &dyn RateStore) -> anyhow::Result<Value> {
    let output = match command {
        Command::Currencies => {
            let list: CurrencyList = cache.get_currencies().await?.into_iter().collect();
            serde_json::to_value(list)?
        }
        Command::Get { code } => {
            let series = cache.get(code).await?;
            serde_json::to_value(RateChart::from(&series))?
        }
        Command::Refresh { code } => summary_json(&cache.refresh(code).await?),
        Command::RefreshAll => summary_json(&cache.refresh_all().await?),
        Command::InitSchema => {
            store.ensure_schema().await?;
            info!(store = store.name(), "Schema ready");
            json!({ "store": store.name(), "ready": true })
        }
    };

    Ok(output)
}

fn summary_json(summary: &RefreshSummary) -> Value {
    json!({
        "scope": summary.scope.to_string(),
        "days_read": summary.days_read,
        "currencies": summary.currencies.iter().map(CurrencyCode::as_str).collect::<Vec<_>>(),
        "cells": summary.cells,
        "onboarded": summary.onboarded.iter().map(CurrencyCode::as_str).collect::<Vec<_>>(),
        "skipped_cells": summary.skipped_cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ratewindow_common::today;
    use ratewindow_rates::source::DayNode;
    use ratewindow_rates::{MemoryRateStore, RatesConfig, SourceDocument, StaticSource};

    fn setup() -> (RateCache, Arc<MemoryRateStore>) {
        let day = today().format("%Y-%m-%d").to_string();
        let document = SourceDocument::new(vec![DayNode::new(&day, [("USD", "1.0956"), ("JPY", "155.52")])]);

        let store = Arc::new(MemoryRateStore::new());
        let cache = RateCache::new(
            Arc::new(StaticSource::new(document)),
            store.clone(),
            RatesConfig::default(),
        );
        (cache, store)
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["ratewindow", "get", "usd"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Get { code: CurrencyCode::parse("USD").unwrap() }
        );

        let cli = Cli::try_parse_from(["ratewindow", "refresh-all"]).unwrap();
        assert_eq!(cli.command, Command::RefreshAll);

        assert!(Cli::try_parse_from(["ratewindow", "get", "dollars"]).is_err());
    }

    #[tokio::test]
    async fn test_get_prints_chart() {
        let (cache, store) = setup();
        let get = Command::Get { code: CurrencyCode::parse("USD").unwrap() };

        let output = execute(&get, &cache, store.as_ref()).await.unwrap();

        assert_eq!(output["rates"], json!([1.0956]));
        assert_eq!(output["dates"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_refresh_all_then_currencies() {
        let (cache, store) = setup();

        let summary = execute(&Command::RefreshAll, &cache, store.as_ref()).await.unwrap();
        assert_eq!(summary["scope"], "ALL");
        assert_eq!(summary["cells"], 2);
        assert_eq!(summary["onboarded"], json!(["JPY", "USD"]));

        let list = execute(&Command::Currencies, &cache, store.as_ref()).await.unwrap();
        assert_eq!(list, json!({ "currencies": ["JPY", "USD"] }));
    }

    #[tokio::test]
    async fn test_refresh_of_unpublished_currency_is_empty() {
        let (cache, store) = setup();
        let refresh = Command::Refresh { code: CurrencyCode::parse("CHF").unwrap() };

        let summary = execute(&refresh, &cache, store.as_ref()).await.unwrap();

        assert_eq!(summary["scope"], "CHF");
        assert_eq!(summary["cells"], 0);
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let (cache, store) = setup();
        store.set_online(false);

        let result = execute(&Command::InitSchema, &cache, store.as_ref()).await;
        tokio_test::assert_err!(result);
    }
}
