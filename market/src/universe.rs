//! Token universe and per-user favorites.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tickerdeck_common::{ChainId, Favorites, TokenId, TokenRef, Universe, UserId, MAX_FAVORITES};
use tracing::{debug, info};

use crate::cache::MarketCache;
use crate::error::{MarketError, MarketResult};

/// Majors shown for every user.
pub fn default_majors() -> Vec<TokenRef> {
    vec![
        TokenRef::new("bitcoin", "btc", "Bitcoin").with_binance_symbol("BTCUSDT"),
        TokenRef::new("ethereum", "eth", "Ethereum").with_binance_symbol("ETHUSDT"),
        TokenRef::new("solana", "sol", "Solana").with_binance_symbol("SOLUSDT"),
        TokenRef::new("binancecoin", "bnb", "BNB").with_binance_symbol("BNBUSDT"),
        TokenRef::new("ripple", "xrp", "XRP").with_binance_symbol("XRPUSDT"),
        TokenRef::new("cardano", "ada", "Cardano").with_binance_symbol("ADAUSDT"),
        TokenRef::new("dogecoin", "doge", "Dogecoin").with_binance_symbol("DOGEUSDT"),
        TokenRef::new("avalanche-2", "avax", "Avalanche").with_binance_symbol("AVAXUSDT"),
        TokenRef::new("chainlink", "link", "Chainlink").with_binance_symbol("LINKUSDT"),
        TokenRef::new("polkadot", "dot", "Polkadot").with_binance_symbol("DOTUSDT"),
    ]
}

/// Chain-specific token lists.
pub fn default_chains() -> BTreeMap<ChainId, Vec<TokenRef>> {
    let mut chains = BTreeMap::new();

    chains.insert(
        ChainId::new("ethereum"),
        vec![
            TokenRef::new("uniswap", "uni", "Uniswap").with_binance_symbol("UNIUSDT"),
            TokenRef::new("aave", "aave", "Aave").with_binance_symbol("AAVEUSDT"),
            TokenRef::new("lido-dao", "ldo", "Lido DAO").with_binance_symbol("LDOUSDT"),
            TokenRef::new("pepe", "pepe", "Pepe").with_binance_symbol("PEPEUSDT"),
        ],
    );
    chains.insert(
        ChainId::new("solana"),
        vec![
            TokenRef::new("jupiter-exchange-solana", "jup", "Jupiter").with_binance_symbol("JUPUSDT"),
            TokenRef::new("bonk", "bonk", "Bonk").with_binance_symbol("BONKUSDT"),
            TokenRef::new("raydium", "ray", "Raydium").with_binance_symbol("RAYUSDT"),
            TokenRef::new("dogwifcoin", "wif", "dogwifhat").with_binance_symbol("WIFUSDT"),
        ],
    );
    chains.insert(
        ChainId::new("base"),
        vec![
            TokenRef::new("aerodrome-finance", "aero", "Aerodrome"),
            TokenRef::new("degen-base", "degen", "Degen"),
            TokenRef::new("brett", "brett", "Brett"),
        ],
    );

    for (chain, tokens) in chains.iter_mut() {
        for token in tokens.iter_mut() {
            token.chain = Some(chain.clone());
        }
    }
    chains
}

/// The built-in universe.
pub fn default_universe() -> Universe {
    Universe::new(default_majors(), default_chains())
}

/// Serves the cached universe and manages favorites.
pub struct UniverseService {
    cache: Arc<MarketCache>,
}

impl UniverseService {
    pub fn new(cache: Arc<MarketCache>) -> Self {
        Self { cache }
    }

    /// The cached universe, seeded from the built-in lists on a miss.
    pub async fn universe(&self) -> MarketResult<Universe> {
        if let Some(universe) = self.cache.get_universe().await? {
            return Ok(universe);
        }
        self.rebuild().await
    }

    /// Rebuild the universe from the built-in lists and store it.
    pub async fn rebuild(&self) -> MarketResult<Universe> {
        let universe = default_universe();
        self.cache.put_universe(&universe).await?;
        info!(
            majors = universe.majors.len(),
            chains = universe.chains.len(),
            "Universe rebuilt"
        );
        Ok(universe)
    }

    /// Replace a user's favorites.
    ///
    /// Ids are normalized and de-duplicated with order kept; more than
    /// [`MAX_FAVORITES`] distinct ids is rejected.
    pub async fn set_favorites(&self, user: &UserId, ids: &[String]) -> MarketResult<Favorites> {
        if !user.is_valid() {
            return Err(MarketError::InvalidInput(format!("invalid user id '{}'", user)));
        }

        let mut seen = HashSet::new();
        let mut tokens = Vec::new();
        for raw in ids {
            let id = TokenId::new(raw.as_str());
            if !id.is_valid() {
                return Err(MarketError::InvalidInput(format!("invalid token id '{}'", raw)));
            }
            if seen.insert(id.clone()) {
                tokens.push(id);
            }
        }
        if tokens.len() > MAX_FAVORITES {
            return Err(MarketError::InvalidInput(format!(
                "at most {} favorites allowed, got {}",
                MAX_FAVORITES,
                tokens.len()
            )));
        }

        let favorites = Favorites::new(user.clone(), tokens);
        self.cache.put_favorites(&favorites).await?;
        debug!(user = %user, count = favorites.tokens.len(), "Favorites updated");
        Ok(favorites)
    }

    /// A user's favorites, empty when none were stored.
    pub async fn favorites(&self, user: &UserId) -> MarketResult<Favorites> {
        Ok(self
            .cache
            .get_favorites(user)
            .await?
            .unwrap_or_else(|| Favorites::empty(user.clone())))
    }

    /// Favorites of every user that are not already in `universe`.
    pub async fn favorite_tokens(&self, universe: &Universe) -> MarketResult<Vec<TokenRef>> {
        let mut seen = HashSet::new();
        let mut extra = Vec::new();

        for favorites in self.cache.all_favorites().await? {
            for id in favorites.tokens {
                if universe.find(&id).is_none() && seen.insert(id.clone()) {
                    extra.push(TokenRef::bare(id));
                }
            }
        }
        Ok(extra)
    }

    /// Map ids to token references, bare ones for ids outside the universe.
    pub async fn resolve(&self, ids: &[TokenId]) -> MarketResult<Vec<TokenRef>> {
        let universe = self.universe().await?;
        Ok(resolve_in(&universe, ids))
    }
}

/// Resolve ids against a known universe, de-duplicated with order kept.
pub fn resolve_in(universe: &Universe, ids: &[TokenId]) -> Vec<TokenRef> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .map(|id| {
            universe
                .find(id)
                .cloned()
                .unwrap_or_else(|| TokenRef::bare(id.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MarketCacheConfig;
    use tickerdeck_kv::{KvCache, MemoryStore};

    fn service() -> UniverseService {
        let kv = KvCache::new(Arc::new(MemoryStore::new()), "");
        UniverseService::new(Arc::new(MarketCache::new(kv, MarketCacheConfig::default())))
    }

    #[test]
    fn test_default_universe() {
        let universe = default_universe();

        assert_eq!(universe.majors[0].id.as_str(), "bitcoin");
        assert!(universe.majors.iter().all(|t| t.chain.is_none()));
        assert!(universe
            .chain(&ChainId::new("solana"))
            .iter()
            .all(|t| t.chain == Some(ChainId::new("solana"))));

        let ids: Vec<_> = universe.all_tokens().into_iter().map(|t| t.id).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert!(ids.iter().all(|id| id.is_valid()));
    }

    #[tokio::test]
    async fn test_universe_is_seeded_once() {
        let service = service();

        let first = service.universe().await.unwrap();
        let second = service.universe().await.unwrap();

        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn test_set_favorites_normalizes() {
        let service = service();
        let user = UserId::new("alice");

        let favorites = service
            .set_favorites(
                &user,
                &["PEPE".to_string(), "bonk".to_string(), "pepe".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(favorites.tokens, vec![TokenId::new("pepe"), TokenId::new("bonk")]);
        assert_eq!(service.favorites(&user).await.unwrap().tokens.len(), 2);
    }

    #[tokio::test]
    async fn test_set_favorites_rejects_bad_input() {
        let service = service();
        let user = UserId::new("alice");

        let bad_id = service.set_favorites(&user, &["no spaces".to_string()]).await;
        assert!(matches!(bad_id, Err(MarketError::InvalidInput(_))));

        let too_many: Vec<String> = (0..=MAX_FAVORITES).map(|i| format!("token-{i}")).collect();
        let result = service.set_favorites(&user, &too_many).await;
        assert!(matches!(result, Err(MarketError::InvalidInput(_))));

        let bad_user = service.set_favorites(&UserId::new(""), &[]).await;
        assert!(matches!(bad_user, Err(MarketError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_favorite_tokens_outside_universe() {
        let service = service();
        let universe = service.universe().await.unwrap();

        service
            .set_favorites(&UserId::new("alice"), &["bitcoin".into(), "shiba-inu".into()])
            .await
            .unwrap();
        service
            .set_favorites(&UserId::new("bob"), &["shiba-inu".into(), "floki".into()])
            .await
            .unwrap();

        let extra = service.favorite_tokens(&universe).await.unwrap();
        let ids: Vec<&str> = extra.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["shiba-inu", "floki"]);
    }

    #[tokio::test]
    async fn test_resolve() {
        let service = service();

        let tokens = service
            .resolve(&[TokenId::new("bitcoin"), TokenId::new("floki"), TokenId::new("bitcoin")])
            .await
            .unwrap();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].symbol, "BTC");
        assert_eq!(tokens[0].binance_symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(tokens[1].symbol, "FLOKI");
    }
}
