//! Market cache: prices, FX rates, universe and favorites over the KV store.
//!
//! Key layout:
//!
//! | Key | Value | Expiry |
//! |-----|-------|--------|
//! | `price:{CUR}:{token}` | [`PricePoint`] | `price_ttl` |
//! | `lkg:{CUR}:{token}` | last known good [`PricePoint`] | none |
//! | `fx:{BASE}:{QUOTE}` | [`FxRate`] | `fx_ttl` |
//! | `universe` | [`Universe`] | `universe_ttl` |
//! | `favorites:{user}` | [`Favorites`] | none |
//! | `refresh:last` | [`RefreshReport`] | none |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tickerdeck_common::constants;
use tickerdeck_common::{
    Currency, CurrencyPair, DurationExt, Favorites, FxRate, PricePoint, TokenId, TokenRef, Universe,
    UserId,
};
use tickerdeck_kv::KvCache;
use tracing::debug;

use crate::engine::RefreshReport;
use crate::error::MarketResult;

const FAVORITES_PREFIX: &str = "favorites:";

/// Lifetimes of cached market data.
#[derive(Debug, Clone)]
pub struct MarketCacheConfig {
    pub price_ttl: Duration,
    pub fx_ttl: Duration,
    pub universe_ttl: Duration,
}

impl Default for MarketCacheConfig {
    fn default() -> Self {
        Self {
            price_ttl: constants::price_ttl().as_std(),
            fx_ttl: constants::fx_ttl().as_std(),
            universe_ttl: constants::universe_ttl().as_std(),
        }
    }
}

/// Result of a batch price lookup.
#[derive(Debug, Clone, Default)]
pub struct PriceLookup {
    pub hits: Vec<PricePoint>,
    pub misses: Vec<TokenRef>,
}

/// Typed market cache.
pub struct MarketCache {
    kv: KvCache,
    config: MarketCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MarketCache {
    pub fn new(kv: KvCache, config: MarketCacheConfig) -> Self {
        Self {
            kv,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MarketCacheConfig {
        &self.config
    }

    /// Cached price of one token in `currency`.
    pub async fn get_price(&self, token: &TokenId, currency: &Currency) -> MarketResult<Option<PricePoint>> {
        let point = self.kv.get_json(&price_key(currency, token)).await?;
        self.record(point.is_some());
        Ok(point)
    }

    /// Split `tokens` into cached points and misses, keeping input order.
    pub async fn get_prices(&self, tokens: &[TokenRef], currency: &Currency) -> MarketResult<PriceLookup> {
        let mut lookup = PriceLookup::default();
        for token in tokens {
            match self.get_price(&token.id, currency).await? {
                Some(point) => lookup.hits.push(point),
                None => lookup.misses.push(token.clone()),
            }
        }

        debug!(
            currency = %currency,
            hits = lookup.hits.len(),
            misses = lookup.misses.len(),
            "Price cache lookup"
        );
        Ok(lookup)
    }

    /// Store a fresh point and keep it as the last known good copy.
    pub async fn put_price(&self, point: &PricePoint) -> MarketResult<()> {
        self.kv
            .set_json(
                &price_key(&point.currency, &point.token_id),
                point,
                Some(self.config.price_ttl),
            )
            .await?;
        self.kv
            .set_json(&lkg_key(&point.currency, &point.token_id), point, None)
            .await?;
        Ok(())
    }

    /// Most recent point ever stored, regardless of age.
    pub async fn last_known_good(&self, token: &TokenId, currency: &Currency) -> MarketResult<Option<PricePoint>> {
        Ok(self.kv.get_json(&lkg_key(currency, token)).await?)
    }

    pub async fn get_fx(&self, pair: &CurrencyPair) -> MarketResult<Option<FxRate>> {
        let rate = self.kv.get_json(&fx_key(pair)).await?;
        self.record(rate.is_some());
        Ok(rate)
    }

    pub async fn put_fx(&self, rate: &FxRate) -> MarketResult<()> {
        self.kv
            .set_json(&fx_key(&rate.pair), rate, Some(self.config.fx_ttl))
            .await?;
        Ok(())
    }

    pub async fn get_universe(&self) -> MarketResult<Option<Universe>> {
        Ok(self.kv.get_json("universe").await?)
    }

    pub async fn put_universe(&self, universe: &Universe) -> MarketResult<()> {
        self.kv
            .set_json("universe", universe, Some(self.config.universe_ttl))
            .await?;
        Ok(())
    }

    pub async fn get_favorites(&self, user: &UserId) -> MarketResult<Option<Favorites>> {
        Ok(self.kv.get_json(&favorites_key(user)).await?)
    }

    pub async fn put_favorites(&self, favorites: &Favorites) -> MarketResult<()> {
        self.kv
            .set_json(&favorites_key(&favorites.user_id), favorites, None)
            .await?;
        Ok(())
    }

    /// Every stored favorites list.
    pub async fn all_favorites(&self) -> MarketResult<Vec<Favorites>> {
        let mut all = Vec::new();
        for key in self.kv.keys(FAVORITES_PREFIX).await? {
            if let Some(favorites) = self.kv.get_json::<Favorites>(&key).await? {
                all.push(favorites);
            }
        }
        Ok(all)
    }

    pub async fn last_refresh(&self) -> MarketResult<Option<RefreshReport>> {
        Ok(self.kv.get_json("refresh:last").await?)
    }

    pub async fn put_last_refresh(&self, report: &RefreshReport) -> MarketResult<()> {
        self.kv.set_json("refresh:last", report, None).await?;
        Ok(())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Hit and miss counters for price and FX lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

fn price_key(currency: &Currency, token: &TokenId) -> String {
    format!("price:{}:{}", currency, token)
}

fn lkg_key(currency: &Currency, token: &TokenId) -> String {
    format!("lkg:{}:{}", currency, token)
}

fn fx_key(pair: &CurrencyPair) -> String {
    format!("fx:{}:{}", pair.base, pair.quote)
}

fn favorites_key(user: &UserId) -> String {
    format!("{}{}", FAVORITES_PREFIX, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tickerdeck_common::Quote;
    use tickerdeck_kv::{KvStore, MemoryStore};

    fn cache_with(config: MarketCacheConfig) -> (Arc<MemoryStore>, MarketCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = MarketCache::new(KvCache::new(store.clone(), ""), config);
        (store, cache)
    }

    fn point(id: &str, usd: rust_decimal::Decimal) -> PricePoint {
        let token = TokenRef::bare(TokenId::new(id));
        let quote = Quote::new(token.id.clone(), usd, "TEST");
        let fx = FxRate::new(CurrencyPair::from_usd(Currency::eur()), dec!(0.9), "TEST");
        PricePoint::from_quote(&token, &quote, &fx).unwrap()
    }

    #[tokio::test]
    async fn test_price_keys_and_lookup() {
        let (store, cache) = cache_with(MarketCacheConfig::default());
        cache.put_price(&point("bitcoin", dec!(50000))).await.unwrap();

        assert!(store.get("price:EUR:bitcoin").await.unwrap().is_some());
        assert!(store.get("lkg:EUR:bitcoin").await.unwrap().is_some());
        assert!(store.ttl("lkg:EUR:bitcoin").await.unwrap().is_none());

        let tokens = vec![
            TokenRef::bare(TokenId::new("bitcoin")),
            TokenRef::bare(TokenId::new("solana")),
        ];
        let lookup = cache.get_prices(&tokens, &Currency::eur()).await.unwrap();

        assert_eq!(lookup.hits.len(), 1);
        assert_eq!(lookup.hits[0].local, dec!(45000.00));
        assert_eq!(lookup.misses.len(), 1);
        assert_eq!(lookup.misses[0].id.as_str(), "solana");
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_expired_price_keeps_last_known_good() {
        let (_, cache) = cache_with(MarketCacheConfig {
            price_ttl: Duration::from_millis(20),
            ..MarketCacheConfig::default()
        });
        cache.put_price(&point("bitcoin", dec!(50000))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let id = TokenId::new("bitcoin");
        assert!(cache.get_price(&id, &Currency::eur()).await.unwrap().is_none());
        let lkg = cache.last_known_good(&id, &Currency::eur()).await.unwrap().unwrap();
        assert_eq!(lkg.usd, dec!(50000));
    }

    #[tokio::test]
    async fn test_fx_round_trip() {
        let (store, cache) = cache_with(MarketCacheConfig::default());
        let rate = FxRate::new(CurrencyPair::from_usd(Currency::gbp()), dec!(0.79), "TEST");

        cache.put_fx(&rate).await.unwrap();

        assert!(store.get("fx:USD:GBP").await.unwrap().is_some());
        let cached = cache.get_fx(&rate.pair).await.unwrap().unwrap();
        assert_eq!(cached.rate, dec!(0.79));
    }

    #[tokio::test]
    async fn test_all_favorites() {
        let (_, cache) = cache_with(MarketCacheConfig::default());
        cache
            .put_favorites(&Favorites::new(UserId::new("alice"), vec![TokenId::new("pepe")]))
            .await
            .unwrap();
        cache
            .put_favorites(&Favorites::new(UserId::new("bob"), vec![TokenId::new("bonk")]))
            .await
            .unwrap();

        let all = cache.all_favorites().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_id.as_str(), "alice");
        assert_eq!(all[1].tokens, vec![TokenId::new("bonk")]);
    }
}
