//! Binance spot 24h ticker provider.
//!
//! Only quotes tokens that carry a `binance_symbol` (a USDT pair); USDT is
//! taken at par with USD.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tickerdeck_common::{Quote, TokenRef};
use tracing::{debug, warn};

use crate::error::{MarketError, MarketResult};
use crate::http::{build_client, send_json, DEFAULT_TIMEOUT};
use crate::provider::PriceProvider;

const PROVIDER_ID: &str = "BINANCE";

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
struct Ticker24hr {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

/// Binance price provider.
pub struct BinanceProvider {
    client: Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
        }
    }

    async fn fetch_tickers(&self, symbols: &[&str]) -> MarketResult<Vec<Ticker24hr>> {
        let symbols_param =
            serde_json::to_string(symbols).map_err(|e| MarketError::InvalidInput(e.to_string()))?;
        let url = format!("{}/api/v3/ticker/24hr", self.base_url.trim_end_matches('/'));

        debug!(provider = PROVIDER_ID, symbols = symbols.len(), "Requesting tickers");
        send_json(
            PROVIDER_ID,
            self.client.get(&url).query(&[("symbols", symbols_param.as_str())]),
        )
        .await
    }

    /// One request per symbol, skipping the ones Binance rejects.
    async fn fetch_each(&self, symbols: &[&str]) -> MarketResult<Vec<Ticker24hr>> {
        let mut tickers = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.fetch_tickers(std::slice::from_ref(symbol)).await {
                Ok(found) => tickers.extend(found),
                Err(MarketError::Rejected { .. }) => {
                    warn!(provider = PROVIDER_ID, symbol = %symbol, "Symbol rejected");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(tickers)
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    fn supports(&self, token: &TokenRef) -> bool {
        token.binance_symbol.is_some()
    }

    async fn fetch_prices(&self, tokens: &[TokenRef]) -> MarketResult<Vec<Quote>> {
        let listed: Vec<(&TokenRef, &str)> = tokens
            .iter()
            .filter_map(|t| t.binance_symbol.as_deref().map(|s| (t, s)))
            .collect();
        if listed.is_empty() {
            return Ok(Vec::new());
        }

        let symbols: Vec<&str> = listed.iter().map(|(_, s)| *s).collect();
        let tickers = match self.fetch_tickers(&symbols).await {
            Ok(tickers) => tickers,
            // One unlisted symbol fails the whole batch.
            Err(MarketError::Rejected { message, .. }) => {
                warn!(provider = PROVIDER_ID, %message, "Batch rejected, retrying per symbol");
                self.fetch_each(&symbols).await?
            }
            Err(e) => return Err(e),
        };

        let mut quotes = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let Some((token, _)) = listed.iter().find(|(_, s)| *s == ticker.symbol) else {
                continue;
            };
            let usd = match Decimal::from_str(&ticker.last_price) {
                Ok(price) if price > Decimal::ZERO => price,
                _ => {
                    warn!(provider = PROVIDER_ID, symbol = %ticker.symbol, "Unusable last price");
                    continue;
                }
            };

            let mut quote = Quote::new(token.id.clone(), usd, PROVIDER_ID);
            if let Ok(change) = Decimal::from_str(&ticker.price_change_percent) {
                quote = quote.with_change(change);
            }
            quotes.push(quote);
        }

        Ok(quotes)
    }
}
