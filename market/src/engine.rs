//! Market engine: fetch, convert and cache prices.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tickerdeck_common::constants;
use tickerdeck_common::{
    Currency, CurrencyPair, DurationExt, FxRate, PricePoint, Quote, TokenId, TokenRef,
};
use tickerdeck_kv::{DistributedLock, KvCache, KvError};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, MarketCache, MarketCacheConfig};
use crate::error::{MarketError, MarketResult};
use crate::fx::FxProvider;
use crate::provider::PriceProvider;
use crate::universe::{resolve_in, UniverseService};

const REFRESH_LOCK_KEY: &str = "refresh";

/// Configuration for the market engine.
#[derive(Debug, Clone)]
pub struct MarketEngineConfig {
    /// Cache lifetimes.
    pub cache: MarketCacheConfig,
    /// Served points older than this are flagged stale.
    pub stale_after: chrono::Duration,
    /// Lifetime of the refresh lock; bounds a crashed refresh.
    pub refresh_lock_ttl: Duration,
}

impl Default for MarketEngineConfig {
    fn default() -> Self {
        Self {
            cache: MarketCacheConfig::default(),
            stale_after: constants::stale_after(),
            refresh_lock_ttl: constants::refresh_lock_ttl().as_std(),
        }
    }
}

/// A price as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServedPrice {
    #[serde(flatten)]
    pub point: PricePoint,
    /// Older than the staleness threshold, or a last known good copy.
    pub stale: bool,
}

/// Prices for a set of tokens in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBoard {
    pub currency: Currency,
    pub prices: Vec<ServedPrice>,
    /// Tokens with no price at all.
    pub missing: Vec<TokenId>,
    pub generated_at: DateTime<Utc>,
}

impl PriceBoard {
    pub fn get(&self, id: &TokenId) -> Option<&ServedPrice> {
        self.prices.iter().find(|p| &p.point.token_id == id)
    }
}

/// Outcome of a refresh run, stored under `refresh:last`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub currency: Currency,
    pub fx_rate: Decimal,
    pub fx_source: String,
    pub tokens_requested: usize,
    pub prices_updated: usize,
    pub missing: Vec<TokenId>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// The market engine.
pub struct MarketEngine {
    prices: Arc<dyn PriceProvider>,
    fx: Arc<dyn FxProvider>,
    cache: Arc<MarketCache>,
    universe: UniverseService,
    locks: DistributedLock,
    config: MarketEngineConfig,
}

impl MarketEngine {
    /// Create a new engine over the given providers and cache.
    pub fn new(
        prices: Arc<dyn PriceProvider>,
        fx: Arc<dyn FxProvider>,
        kv: KvCache,
        config: MarketEngineConfig,
    ) -> Self {
        let locks = DistributedLock::new(kv.store().clone());
        let cache = Arc::new(MarketCache::new(kv, config.cache.clone()));
        Self {
            prices,
            fx,
            universe: UniverseService::new(cache.clone()),
            cache,
            locks,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<MarketCache> {
        &self.cache
    }

    pub fn universe(&self) -> &UniverseService {
        &self.universe
    }

    pub fn config(&self) -> &MarketEngineConfig {
        &self.config
    }

    /// Current USD rate into `currency`.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn fx_rate(&self, currency: &Currency) -> MarketResult<FxRate> {
        validate_currency(currency)?;
        let pair = CurrencyPair::from_usd(currency.clone());
        if pair.is_identity() {
            return Ok(FxRate::identity(currency.clone()));
        }

        if let Some(cached) = self.cache.get_fx(&pair).await? {
            debug!("Using cached rate");
            return Ok(cached);
        }

        self.fetch_fx(&pair).await
    }

    /// Prices for `ids` in `currency`, from cache where possible.
    ///
    /// Misses are fetched in one provider call. When that fails, misses are
    /// answered from the last known good copy and flagged stale; tokens
    /// without any copy are listed as missing. If nothing at all can be
    /// served the provider error is returned.
    #[instrument(skip(self, ids), fields(currency = %currency, tokens = ids.len()))]
    pub async fn prices(&self, ids: &[TokenId], currency: &Currency) -> MarketResult<PriceBoard> {
        validate_currency(currency)?;
        if let Some(bad) = ids.iter().find(|id| !id.is_valid()) {
            return Err(MarketError::InvalidInput(format!("invalid token id '{}'", bad)));
        }

        let universe = self.universe.universe().await?;
        let tokens = resolve_in(&universe, ids);
        let lookup = self.cache.get_prices(&tokens, currency).await?;

        let mut served: HashMap<TokenId, ServedPrice> = lookup
            .hits
            .into_iter()
            .map(|point| {
                let stale = point.is_stale(self.config.stale_after);
                (point.token_id.clone(), ServedPrice { point, stale })
            })
            .collect();

        let mut upstream_error = None;
        if !lookup.misses.is_empty() {
            let fetched = match self.fx_rate(currency).await {
                Ok(fx) => self.fetch_and_store(&lookup.misses, &fx).await,
                Err(e) => Err(e),
            };
            match fetched {
                Ok(points) => {
                    for point in points {
                        served.insert(point.token_id.clone(), ServedPrice { point, stale: false });
                    }
                }
                Err(e) => {
                    warn!(misses = lookup.misses.len(), error = %e, "Price fetch failed, trying last known good");
                    upstream_error = Some(e);
                }
            }

            for token in &lookup.misses {
                if served.contains_key(&token.id) {
                    continue;
                }
                if let Some(point) = self.cache.last_known_good(&token.id, currency).await? {
                    served.insert(token.id.clone(), ServedPrice { point, stale: true });
                }
            }
        }

        if served.is_empty() {
            if let Some(e) = upstream_error {
                return Err(e);
            }
        }

        let mut board = PriceBoard {
            currency: currency.clone(),
            prices: Vec::with_capacity(tokens.len()),
            missing: Vec::new(),
            generated_at: Utc::now(),
        };
        for token in &tokens {
            match served.remove(&token.id) {
                Some(price) => board.prices.push(price),
                None => board.missing.push(token.id.clone()),
            }
        }

        Ok(board)
    }

    /// Refresh FX and every universe and favorite token, under the refresh lock.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn refresh(&self, currency: &Currency) -> MarketResult<RefreshReport> {
        validate_currency(currency)?;

        let Some(guard) = self
            .locks
            .try_acquire(REFRESH_LOCK_KEY, self.config.refresh_lock_ttl)
            .await?
        else {
            info!("Refresh already running elsewhere");
            return Err(MarketError::RefreshInProgress);
        };

        let result = self.refresh_locked(currency).await;

        match guard.release().await {
            Ok(()) => {}
            Err(KvError::LockLost { key }) => {
                warn!(key = %key, "Refresh outlived its lock");
            }
            Err(e) => return Err(e.into()),
        }

        result
    }

    /// The last stored refresh report.
    pub async fn last_refresh(&self) -> MarketResult<Option<RefreshReport>> {
        self.cache.last_refresh().await
    }

    /// Get engine statistics.
    pub fn stats(&self) -> MarketEngineStats {
        MarketEngineStats {
            cache: self.cache.stats(),
        }
    }

    async fn refresh_locked(&self, currency: &Currency) -> MarketResult<RefreshReport> {
        let started_at = Utc::now();
        let started = Instant::now();

        let universe = self.universe.universe().await?;
        let mut tokens = universe.all_tokens();
        tokens.extend(self.universe.favorite_tokens(&universe).await?);

        let pair = CurrencyPair::from_usd(currency.clone());
        let fx = if pair.is_identity() {
            FxRate::identity(currency.clone())
        } else {
            self.fetch_fx(&pair).await?
        };
        let points = self.fetch_and_store(&tokens, &fx).await?;

        let mut missing: Vec<TokenId> = tokens.iter().map(|t| t.id.clone()).collect();
        missing.retain(|id| !points.iter().any(|p| &p.token_id == id));

        let report = RefreshReport {
            currency: currency.clone(),
            fx_rate: fx.rate,
            fx_source: fx.source,
            tokens_requested: tokens.len(),
            prices_updated: points.len(),
            missing,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.cache.put_last_refresh(&report).await?;

        info!(
            tokens = report.tokens_requested,
            updated = report.prices_updated,
            missing = report.missing.len(),
            duration_ms = report.duration_ms,
            "Refresh completed"
        );
        Ok(report)
    }

    /// Fetch fresh quotes, convert them with `fx` and store them.
    async fn fetch_and_store(&self, tokens: &[TokenRef], fx: &FxRate) -> MarketResult<Vec<PricePoint>> {
        let quotes = self.prices.fetch_prices(tokens).await?;
        let by_id: HashMap<&TokenId, &TokenRef> = tokens.iter().map(|t| (&t.id, t)).collect();

        let mut points = Vec::with_capacity(quotes.len());
        for quote in &quotes {
            let Some(token) = by_id.get(&quote.token_id) else {
                continue;
            };
            if !is_usable(quote) {
                warn!(token = %quote.token_id, provider = %quote.source, "Ignoring non-positive quote");
                continue;
            }

            let Some(point) = PricePoint::from_quote(token, quote, fx) else {
                warn!(
                    token = %quote.token_id,
                    provider = %quote.source,
                    usd = %quote.usd,
                    currency = %fx.pair.quote,
                    "Dropping quote that overflows on conversion"
                );
                continue;
            };
            self.cache.put_price(&point).await?;
            points.push(point);
        }

        debug!(
            requested = tokens.len(),
            stored = points.len(),
            "Stored fresh prices"
        );
        Ok(points)
    }

    async fn fetch_fx(&self, pair: &CurrencyPair) -> MarketResult<FxRate> {
        let rate = self.fx.fetch_rate(pair).await?;
        self.cache.put_fx(&rate).await?;
        debug!(pair = %pair, rate = %rate.rate, source = %rate.source, "Cached fresh FX rate");
        Ok(rate)
    }
}

/// Engine statistics.
#[derive(Debug, Clone)]
pub struct MarketEngineStats {
    pub cache: CacheStats,
}

fn validate_currency(currency: &Currency) -> MarketResult<()> {
    if currency.is_valid() {
        Ok(())
    } else {
        Err(MarketError::InvalidInput(format!("invalid currency '{}'", currency)))
    }
}

fn is_usable(quote: &Quote) -> bool {
    quote.usd > Decimal::ZERO
}
