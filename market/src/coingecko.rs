//! CoinGecko simple-price provider.
//!
//! Uses `GET /simple/price?ids=..&vs_currencies=usd&include_24hr_change=true`.
//! Ids are sent in batches since the public API caps the query length.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tickerdeck_common::{Quote, TokenId, TokenRef};
use tracing::debug;

use crate::error::MarketResult;
use crate::http::{build_client, decimal_from_number, send_json, DEFAULT_TIMEOUT};
use crate::provider::PriceProvider;

const PROVIDER_ID: &str = "COINGECKO";

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Per-token entry of the simple-price response.
#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<serde_json::Number>,
    usd_24h_change: Option<serde_json::Number>,
}

/// Configuration for [`CoinGeckoProvider`].
#[derive(Debug, Clone)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    /// Sent as `x-cg-demo-api-key` when set.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_ids_per_request: usize,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            max_ids_per_request: 100,
        }
    }
}

/// CoinGecko price provider. Quotes any token by its CoinGecko id.
pub struct CoinGeckoProvider {
    client: Client,
    config: CoinGeckoConfig,
}

impl CoinGeckoProvider {
    pub fn new(config: CoinGeckoConfig) -> Self {
        Self {
            client: build_client(config.timeout),
            config,
        }
    }

    async fn fetch_batch(&self, ids: &[&TokenId]) -> MarketResult<HashMap<String, SimplePrice>> {
        let url = format!("{}/simple/price", self.config.base_url.trim_end_matches('/'));
        let joined = ids
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut request = self.client.get(&url).query(&[
            ("ids", joined.as_str()),
            ("vs_currencies", "usd"),
            ("include_24hr_change", "true"),
        ]);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        debug!(provider = PROVIDER_ID, ids = ids.len(), "Requesting prices");
        send_json(PROVIDER_ID, request).await
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch_prices(&self, tokens: &[TokenRef]) -> MarketResult<Vec<Quote>> {
        let ids: Vec<&TokenId> = tokens.iter().map(|t| &t.id).collect();
        let mut quotes = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.config.max_ids_per_request.max(1)) {
            let prices = self.fetch_batch(chunk).await?;

            for id in chunk {
                let Some(entry) = prices.get(id.as_str()) else {
                    continue;
                };
                let Some(usd) = entry.usd.as_ref().and_then(decimal_from_number) else {
                    continue;
                };

                let mut quote = Quote::new((*id).clone(), usd, PROVIDER_ID);
                if let Some(change) = entry.usd_24h_change.as_ref().and_then(decimal_from_number) {
                    quote = quote.with_change(change);
                }
                quotes.push(quote);
            }
        }

        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketError;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;

    fn provider(server: &MockServer, max_ids: usize) -> CoinGeckoProvider {
        CoinGeckoProvider::new(CoinGeckoConfig {
            base_url: server.base_url(),
            api_key: Some("demo-key".to_string()),
            timeout: Duration::from_secs(2),
            max_ids_per_request: max_ids,
        })
    }

    fn tokens(ids: &[&str]) -> Vec<TokenRef> {
        ids.iter().map(|id| TokenRef::bare(TokenId::new(*id))).collect()
    }

    #[tokio::test]
    async fn test_fetch_prices() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/simple/price")
                    .query_param("ids", "bitcoin,ethereum,nope")
                    .query_param("vs_currencies", "usd")
                    .header("x-cg-demo-api-key", "demo-key");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(serde_json::json!({
                        "bitcoin": {"usd": 50000.12, "usd_24h_change": -1.5},
                        "ethereum": {"usd": 3000}
                    }));
            })
            .await;

        let quotes = provider(&server, 100)
            .fetch_prices(&tokens(&["bitcoin", "ethereum", "nope"]))
            .await
            .unwrap();

        api_mock.assert_async().await;
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].usd, dec!(50000.12));
        assert_eq!(quotes[0].change_24h_pct, Some(dec!(-1.5)));
        assert_eq!(quotes[1].usd, dec!(3000));
        assert_eq!(quotes[1].change_24h_pct, None);
        assert_eq!(quotes[1].source, "COINGECKO");
    }

    #[tokio::test]
    async fn test_ids_are_batched() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(GET).path("/simple/price").query_param("ids", "a,b");
                then.status(200)
                    .json_body(serde_json::json!({"a": {"usd": 1}, "b": {"usd": 2}}));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET).path("/simple/price").query_param("ids", "c");
                then.status(200).json_body(serde_json::json!({"c": {"usd": 3}}));
            })
            .await;

        let quotes = provider(&server, 2)
            .fetch_prices(&tokens(&["a", "b", "c"]))
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(quotes.len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/simple/price");
                then.status(429);
            })
            .await;

        let result = provider(&server, 100).fetch_prices(&tokens(&["bitcoin"])).await;

        assert!(matches!(result, Err(MarketError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/simple/price");
                then.status(500).body("boom");
            })
            .await;

        let result = provider(&server, 100).fetch_prices(&tokens(&["bitcoin"])).await;

        match result {
            Err(MarketError::ProviderError { provider, message }) => {
                assert_eq!(provider, "COINGECKO");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
