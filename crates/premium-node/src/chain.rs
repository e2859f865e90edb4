use chrono::NaiveDate;
use futures::stream::{self, Stream, TryStreamExt};
use premium_common::{ContractSnapshot, ContractType, PremiumError, Result, RunConfig};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::decode::lenient_f64;
use crate::fetcher::RateLimitedFetcher;

#[derive(Debug, Deserialize)]
struct SnapshotPage {
    #[serde(default)]
    results: Option<Vec<Value>>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSnapshot {
    details: Option<RawDetails>,
    greeks: Option<RawGreeks>,
    last_quote: Option<RawQuote>,
    last_trade: Option<RawTrade>,
    day: Option<RawDay>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDetails {
    #[serde(default, deserialize_with = "lenient_f64")]
    strike_price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGreeks {
    #[serde(default, deserialize_with = "lenient_f64")]
    delta: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawQuote {
    #[serde(default, deserialize_with = "lenient_f64")]
    bid: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    bid_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    ask: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    ask_price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTrade {
    #[serde(default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDay {
    #[serde(default, deserialize_with = "lenient_f64")]
    close: Option<f64>,
}

impl From<RawSnapshot> for ContractSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        let quote = raw.last_quote.unwrap_or_default();
        ContractSnapshot {
            delta: raw.greeks.and_then(|g| g.delta),
            strike: raw.details.and_then(|d| d.strike_price),
            bid: quote.bid.or(quote.bid_price),
            ask: quote.ask.or(quote.ask_price),
            last_trade: raw.last_trade.and_then(|t| t.price),
            prev_close: raw.day.and_then(|d| d.close),
        }
    }
}

/// One decoded page and the continuation reference, if any.
struct Page {
    snapshots: Vec<ContractSnapshot>,
    next_url: Option<String>,
}

enum Cursor {
    First,
    Next(String),
}

/// Retrieves every option snapshot for one symbol, expiration and type.
pub struct ChainFetcher {
    fetcher: Arc<RateLimitedFetcher>,
    base_url: String,
    timeout: Duration,
    page_limit: String,
}

impl ChainFetcher {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, config: &RunConfig) -> Self {
        Self {
            fetcher,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.chain_timeout(),
            page_limit: config.page_limit.to_string(),
        }
    }

    /// Lazy, finite sequence of snapshots across all pages.
    ///
    /// The next page is only requested once the current one is drained, and
    /// the stream ends when a page carries no continuation reference. The
    /// first failed page fetch ends the stream with that error.
    pub fn snapshots<'a>(
        &'a self,
        symbol: &'a str,
        expiration: NaiveDate,
        contract_type: ContractType,
    ) -> impl Stream<Item = Result<ContractSnapshot>> + 'a {
        info!(
            "Fetching snapshot for {}, expiration={}, type={}",
            symbol, expiration, contract_type
        );

        stream::try_unfold(Some(Cursor::First), move |cursor| async move {
            let Some(cursor) = cursor else {
                return Ok::<_, PremiumError>(None);
            };
            let page = self.fetch_page(symbol, expiration, contract_type, cursor).await?;
            debug!("Retrieved {} snapshot rows for {}", page.snapshots.len(), symbol);
            Ok(Some((page.snapshots, page.next_url.map(Cursor::Next))))
        })
        .map_ok(|snapshots| stream::iter(snapshots.into_iter().map(Ok::<_, PremiumError>)))
        .try_flatten()
    }

    /// Drain the whole chain; any page failure fails the chain.
    pub async fn fetch_all(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        contract_type: ContractType,
    ) -> Result<Vec<ContractSnapshot>> {
        let snapshots: Vec<ContractSnapshot> = self
            .snapshots(symbol, expiration, contract_type)
            .try_collect()
            .await?;
        info!(
            "Total snapshot rows for {} @ {}: {}",
            symbol,
            expiration,
            snapshots.len()
        );
        Ok(snapshots)
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        contract_type: ContractType,
        cursor: Cursor,
    ) -> Result<Page> {
        let value = match cursor {
            Cursor::First => {
                let url = format!("{}/v3/snapshot/options/{}", self.base_url, symbol);
                let expiration = expiration.format("%Y-%m-%d").to_string();
                let params = [
                    ("limit", self.page_limit.as_str()),
                    ("expiration_date", expiration.as_str()),
                    ("contract_type", contract_type.as_str()),
                ];
                self.fetcher.fetch(&url, &params, self.timeout).await?
            }
            Cursor::Next(url) => self.fetcher.fetch(&url, &[], self.timeout).await?,
        };

        let page: SnapshotPage = serde_json::from_value(value)?;
        let snapshots = page
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<RawSnapshot>(entry) {
                Ok(raw) => Some(ContractSnapshot::from(raw)),
                Err(e) => {
                    debug!("Skipping undecodable snapshot entry for {}: {}", symbol, e);
                    None
                }
            })
            .collect();

        Ok(Page {
            snapshots,
            next_url: page.next_url.filter(|u| !u.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, MockHttpTransport};
    use futures::StreamExt;
    use premium_common::ApiKey;
    use serde_json::json;

    fn chain_fetcher(mock: MockHttpTransport) -> ChainFetcher {
        let config = RunConfig {
            base_url: "https://api.test/".to_string(),
            ..RunConfig::default()
        };
        let fetcher = RateLimitedFetcher::new(
            Arc::new(mock),
            ApiKey::new("test-key").unwrap(),
            config.retry.clone(),
        );
        ChainFetcher::new(Arc::new(fetcher), &config)
    }

    fn expiration() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()
    }

    #[test]
    fn test_raw_snapshot_conversion() {
        // Given - nested groups, alternate quote keys and a string delta
        let raw: RawSnapshot = serde_json::from_value(json!({
            "details": {"strike_price": 155, "contract_type": "call"},
            "greeks": {"delta": "0.31"},
            "last_quote": {"bid_price": 1.0, "ask": 1.2},
            "last_trade": {"price": 1.15},
            "day": {"close": 1.05}
        }))
        .unwrap();

        // When
        let snapshot = ContractSnapshot::from(raw);

        // Then
        assert_eq!(snapshot.strike, Some(155.0));
        assert_eq!(snapshot.delta, Some(0.31));
        assert_eq!(snapshot.bid, Some(1.0));
        assert_eq!(snapshot.ask, Some(1.2));
        assert_eq!(snapshot.last_trade, Some(1.15));
        assert_eq!(snapshot.prev_close, Some(1.05));
    }

    #[test]
    fn test_missing_groups_convert_to_absent_fields() {
        let raw: RawSnapshot = serde_json::from_value(json!({})).unwrap();
        assert_eq!(ContractSnapshot::from(raw), ContractSnapshot::default());
    }

    #[tokio::test]
    async fn test_pages_are_concatenated_in_order() {
        // Given - two pages linked by next_url
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .withf(|url, query, _| {
                url == "https://api.test/v3/snapshot/options/AAPL"
                    && query.contains(&("expiration_date".to_string(), "2024-06-21".to_string()))
                    && query.contains(&("contract_type".to_string(), "put".to_string()))
                    && query.contains(&("limit".to_string(), "250".to_string()))
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(HttpResponse::ok(
                    json!({
                        "results": [
                            {"greeks": {"delta": -0.10}, "details": {"strike_price": 140}},
                            {"greeks": {"delta": -0.20}, "details": {"strike_price": 145}}
                        ],
                        "next_url": "https://api.test/v3/snapshot/options/AAPL?cursor=p2"
                    })
                    .to_string(),
                ))
            });
        mock.expect_get()
            .withf(|url, query, _| {
                url.ends_with("cursor=p2")
                    && query.len() == 1
                    && query[0].0 == crate::fetcher::API_KEY_PARAM
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(HttpResponse::ok(
                    json!({"results": [{"greeks": {"delta": -0.30}, "details": {"strike_price": 150}}]})
                        .to_string(),
                ))
            });
        let chains = chain_fetcher(mock);

        // When
        let snapshots = chains
            .fetch_all("AAPL", expiration(), ContractType::Put)
            .await
            .unwrap();

        // Then
        let strikes: Vec<Option<f64>> = snapshots.iter().map(|s| s.strike).collect();
        assert_eq!(strikes, vec![Some(140.0), Some(145.0), Some(150.0)]);
    }

    #[tokio::test]
    async fn test_next_page_is_requested_lazily() {
        // Given - only the first page may be fetched
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .times(1)
            .returning(|_, _, _| {
                Ok(HttpResponse::ok(
                    json!({
                        "results": [{"greeks": {"delta": 0.5}}],
                        "next_url": "https://api.test/next"
                    })
                    .to_string(),
                ))
            });
        let chains = chain_fetcher(mock);

        // When - take only the first item
        let stream = chains.snapshots("MSFT", expiration(), ContractType::Call);
        futures::pin_mut!(stream);
        let first = stream.next().await.unwrap().unwrap();

        // Then
        assert_eq!(first.delta, Some(0.5));
    }

    #[tokio::test]
    async fn test_failed_page_fails_whole_chain() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .withf(|url, _, _| !url.contains("cursor"))
            .times(1)
            .returning(|_, _, _| {
                Ok(HttpResponse::ok(
                    json!({
                        "results": [{"greeks": {"delta": 0.4}}],
                        "next_url": "https://api.test/v3/snapshot/options/NVDA?cursor=x"
                    })
                    .to_string(),
                ))
            });
        mock.expect_get()
            .withf(|url, _, _| url.contains("cursor"))
            .times(1)
            .returning(|_, _, _| {
                Ok(HttpResponse {
                    status: 502,
                    retry_after: None,
                    body: "bad gateway".to_string(),
                })
            });
        let chains = chain_fetcher(mock);

        let err = chains
            .fetch_all("NVDA", expiration(), ContractType::Call)
            .await
            .unwrap_err();

        assert!(matches!(err, PremiumError::UpstreamHttp { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_empty_chain_and_blank_continuation_terminate() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .times(1)
            .returning(|_, _, _| Ok(HttpResponse::ok(r#"{"results": null, "next_url": ""}"#)));
        let chains = chain_fetcher(mock);

        let snapshots = chains
            .fetch_all("AMZN", expiration(), ContractType::Call)
            .await
            .unwrap();

        assert!(snapshots.is_empty());
    }
}
