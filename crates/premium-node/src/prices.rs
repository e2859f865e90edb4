use chrono::{Duration as ChronoDuration, NaiveDate};
use premium_common::{Result, RunConfig, SymbolEntry};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::decode::lenient_f64;
use crate::fetcher::RateLimitedFetcher;

/// Where a resolved underlying price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Multi-ticker end-of-day snapshot for the given trading day.
    GroupedClose(NaiveDate),
    /// Per-symbol previous-close lookup.
    PreviousClose,
}

/// symbol -> price. Symbols that never resolved are simply absent.
#[derive(Debug, Clone, Default)]
pub struct UnderlyingPrices {
    prices: HashMap<String, (f64, PriceSource)>,
}

impl UnderlyingPrices {
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).map(|(price, _)| *price)
    }

    pub fn source(&self, symbol: &str) -> Option<PriceSource> {
        self.prices.get(symbol).map(|(_, source)| *source)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    pub fn insert(&mut self, symbol: impl Into<String>, price: f64, source: PriceSource) {
        self.prices.insert(symbol.into(), (price, source));
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Option<Vec<AggBar>>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    #[serde(rename = "T", default)]
    ticker: Option<String>,
    #[serde(rename = "c", default, deserialize_with = "lenient_f64")]
    close: Option<f64>,
}

/// Two-tier underlying price lookup.
///
/// Tier 1 pulls one grouped end-of-day snapshot for every non-index symbol,
/// stepping back a day at a time until a non-empty one is found. Tier 2 looks
/// up the previous close individually for index symbols and anything tier 1
/// missed. Failures in either tier only leave the affected symbols unresolved.
pub struct PriceResolver {
    fetcher: Arc<RateLimitedFetcher>,
    base_url: String,
    bulk_timeout: Duration,
    symbol_timeout: Duration,
    lookback_days: u32,
}

impl PriceResolver {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, config: &RunConfig) -> Self {
        Self {
            fetcher,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bulk_timeout: config.bulk_timeout(),
            symbol_timeout: config.symbol_timeout(),
            lookback_days: config.lookback_days,
        }
    }

    pub async fn resolve(&self, symbols: &[SymbolEntry], today: NaiveDate) -> UnderlyingPrices {
        let mut prices = UnderlyingPrices::default();

        let has_stocks = symbols.iter().any(|s| !s.is_index());
        if has_stocks {
            if let Some((date, closes)) = self.latest_grouped_closes(today).await {
                for entry in symbols.iter().filter(|s| !s.is_index()) {
                    if let Some(close) = closes.get(&entry.symbol) {
                        prices.insert(&entry.symbol, *close, PriceSource::GroupedClose(date));
                    }
                }
            }
        }

        let mut attempted = HashSet::new();
        for entry in symbols {
            if prices.contains(&entry.symbol) || !attempted.insert(entry.symbol.as_str()) {
                continue;
            }

            match self.previous_close(&entry.symbol).await {
                Ok(Some(close)) => prices.insert(&entry.symbol, close, PriceSource::PreviousClose),
                Ok(None) => warn!("No prev close in response for {}", entry.symbol),
                Err(e) => warn!("Prev close fetch failed for {}: {}", entry.symbol, e),
            }
        }

        let unresolved = symbols.iter().filter(|s| !prices.contains(&s.symbol)).count();
        if unresolved > 0 {
            warn!("{} symbol(s) left without an underlying price", unresolved);
        }
        prices
    }

    /// Walk back from `today` until a grouped snapshot has rows.
    async fn latest_grouped_closes(&self, today: NaiveDate) -> Option<(NaiveDate, HashMap<String, f64>)> {
        for offset in 0..self.lookback_days {
            let date = today - ChronoDuration::days(i64::from(offset));
            match self.grouped_closes(date).await {
                Ok(closes) if !closes.is_empty() => {
                    info!(
                        "Using grouped stock closes for {} ({} tickers)",
                        date,
                        closes.len()
                    );
                    return Some((date, closes));
                }
                Ok(_) => debug!("Grouped closes for {} are empty", date),
                Err(e) => warn!("Grouped fetch failed for {}: {}", date, e),
            }
        }

        warn!(
            "Could not find grouped stock closes in the last {} days; falling back per-symbol",
            self.lookback_days
        );
        None
    }

    async fn grouped_closes(&self, date: NaiveDate) -> Result<HashMap<String, f64>> {
        let url = format!(
            "{}/v2/aggs/grouped/locale/us/market/stocks/{}",
            self.base_url,
            date.format("%Y-%m-%d")
        );
        let value = self.fetcher.fetch(&url, &[], self.bulk_timeout).await?;
        let response: AggsResponse = serde_json::from_value(value)?;

        Ok(response
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|bar| Some((bar.ticker?, bar.close?)))
            .collect())
    }

    async fn previous_close(&self, symbol: &str) -> Result<Option<f64>> {
        let url = format!("{}/v2/aggs/ticker/{}/prev", self.base_url, symbol);
        let value = self.fetcher.fetch(&url, &[], self.symbol_timeout).await?;
        let response: AggsResponse = serde_json::from_value(value)?;

        Ok(response
            .results
            .and_then(|bars| bars.into_iter().next())
            .and_then(|bar| bar.close))
    }
}
