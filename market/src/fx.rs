//! FX rate providers.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tickerdeck_common::{Currency, CurrencyPair, FxRate};
use tracing::{debug, warn};

use crate::error::{MarketError, MarketResult};
use crate::http::{build_client, decimal_from_number, send_json, DEFAULT_TIMEOUT};

/// Trait for FX rate providers.
#[async_trait]
pub trait FxProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the rate for a currency pair.
    async fn fetch_rate(&self, pair: &CurrencyPair) -> MarketResult<FxRate>;
}

/// Public endpoint of the open exchange-rate API.
pub const DEFAULT_BASE_URL: &str = "https://open.er-api.com/v6";

const EXCHANGE_RATE_API_ID: &str = "EXCHANGE_RATE_API";

#[derive(Debug, Deserialize)]
struct LatestRates {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    rates: HashMap<String, serde_json::Number>,
}

/// Rates from `GET {base}/latest/{BASE}`.
pub struct ExchangeRateApiProvider {
    client: Client,
    base_url: String,
}

impl ExchangeRateApiProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FxProvider for ExchangeRateApiProvider {
    fn name(&self) -> &str {
        EXCHANGE_RATE_API_ID
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> MarketResult<FxRate> {
        let url = format!(
            "{}/latest/{}",
            self.base_url.trim_end_matches('/'),
            pair.base.code()
        );

        let latest: LatestRates = send_json(EXCHANGE_RATE_API_ID, self.client.get(&url)).await?;
        if latest.result != "success" {
            return Err(MarketError::ProviderError {
                provider: EXCHANGE_RATE_API_ID.to_string(),
                message: latest
                    .error_type
                    .unwrap_or_else(|| format!("result {}", latest.result)),
            });
        }

        let rate = latest
            .rates
            .get(pair.quote.code())
            .and_then(decimal_from_number)
            .filter(|rate| *rate > Decimal::ZERO)
            .ok_or_else(|| MarketError::RateNotAvailable(pair.clone()))?;

        debug!(provider = EXCHANGE_RATE_API_ID, pair = %pair, rate = %rate, "Got FX rate");
        Ok(FxRate::new(pair.clone(), rate, EXCHANGE_RATE_API_ID))
    }
}

/// Fixed USD rates, used when the live source is down.
#[derive(Debug, Clone, Default)]
pub struct StaticFxProvider {
    /// Units of currency per USD.
    usd_rates: HashMap<Currency, Decimal>,
}

impl StaticFxProvider {
    pub fn new(usd_rates: HashMap<Currency, Decimal>) -> Self {
        Self { usd_rates }
    }

    /// Parse `"EUR=0.92,GBP=0.79"`.
    pub fn parse(rates_list: &str) -> MarketResult<Self> {
        let mut usd_rates = HashMap::new();

        for item in rates_list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (code, value) = item
                .split_once('=')
                .ok_or_else(|| MarketError::InvalidInput(format!("expected CODE=rate, got '{}'", item)))?;

            let currency = Currency::new(code);
            if !currency.is_valid() {
                return Err(MarketError::InvalidInput(format!("invalid currency '{}'", code)));
            }
            let rate = Decimal::from_str(value.trim())
                .ok()
                .filter(|r| *r > Decimal::ZERO)
                .ok_or_else(|| MarketError::InvalidInput(format!("invalid rate for {}: '{}'", currency, value)))?;

            usd_rates.insert(currency, rate);
        }

        Ok(Self::new(usd_rates))
    }

    /// Currencies with a configured rate.
    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.usd_rates.keys().cloned().collect();
        currencies.sort_by(|a, b| a.code().cmp(b.code()));
        currencies
    }

    fn usd_rate(&self, currency: &Currency) -> Option<Decimal> {
        if *currency == Currency::usd() {
            Some(Decimal::ONE)
        } else {
            self.usd_rates.get(currency).copied()
        }
    }
}

#[async_trait]
impl FxProvider for StaticFxProvider {
    fn name(&self) -> &str {
        "STATIC"
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> MarketResult<FxRate> {
        // Cross through USD.
        let base = self.usd_rate(&pair.base);
        let quote = self.usd_rate(&pair.quote);

        match (base, quote) {
            (Some(base), Some(quote)) => Ok(FxRate::new(pair.clone(), quote / base, "STATIC")),
            _ => Err(MarketError::RateNotAvailable(pair.clone())),
        }
    }
}

/// Live provider first, static rates second.
pub struct FallbackFxProvider {
    primary: Arc<dyn FxProvider>,
    fallback: Arc<dyn FxProvider>,
    fallbacks: AtomicU64,
}

impl FallbackFxProvider {
    pub fn new(primary: Arc<dyn FxProvider>, fallback: Arc<dyn FxProvider>) -> Self {
        Self {
            primary,
            fallback,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// How many times the fallback answered.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FxProvider for FallbackFxProvider {
    fn name(&self) -> &str {
        "FALLBACK"
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> MarketResult<FxRate> {
        if pair.is_identity() {
            return Ok(FxRate::identity(pair.base.clone()));
        }

        match self.primary.fetch_rate(pair).await {
            Ok(rate) => Ok(rate),
            Err(e) => {
                warn!(
                    provider = self.primary.name(),
                    fallback = self.fallback.name(),
                    pair = %pair,
                    error = %e,
                    "FX provider failed, using fallback rate"
                );
                let rate = self.fallback.fetch_rate(pair).await?;
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                Ok(rate)
            }
        }
    }
}

/// Mock FX provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockFxProvider {
    name: String,
    rates: dashmap::DashMap<CurrencyPair, Decimal>,
    calls: AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockFxProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Set the USD rate of a currency.
    pub fn set_usd_rate(&self, quote: Currency, rate: Decimal) {
        self.rates.insert(CurrencyPair::from_usd(quote), rate);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl FxProvider for MockFxProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> MarketResult<FxRate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rates
            .get(pair)
            .map(|rate| FxRate::new(pair.clone(), *rate, self.name.clone()))
            .ok_or_else(|| MarketError::RateNotAvailable(pair.clone()))
    }
}
