//! Token universe and price records.

use crate::{ChainId, Currency, FxRate, TokenId, UserId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Maximum number of favorites a user can track.
pub const MAX_FAVORITES: usize = 50;

/// Reference to a tracked token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    /// Provider identifier.
    pub id: TokenId,
    /// Ticker symbol, upper case.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Chain the token is listed under, `None` for majors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainId>,
    /// Binance spot symbol against USDT, if listed there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binance_symbol: Option<String>,
}

impl TokenRef {
    /// Create a new token reference.
    pub fn new(id: impl Into<TokenId>, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            chain: None,
            binance_symbol: None,
        }
    }

    /// Reference for an id outside the universe; the id doubles as symbol.
    pub fn bare(id: TokenId) -> Self {
        let symbol = id.as_str().to_uppercase();
        let name = id.as_str().to_string();
        Self {
            id,
            symbol,
            name,
            chain: None,
            binance_symbol: None,
        }
    }

    pub fn on_chain(mut self, chain: impl Into<ChainId>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn with_binance_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.binance_symbol = Some(symbol.into().to_uppercase());
        self
    }
}

impl From<TokenId> for TokenRef {
    fn from(id: TokenId) -> Self {
        Self::bare(id)
    }
}

/// The shared set of tracked tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    /// Major tokens shown everywhere.
    pub majors: Vec<TokenRef>,
    /// Chain-specific token lists.
    pub chains: BTreeMap<ChainId, Vec<TokenRef>>,
    /// When the universe was last rebuilt.
    pub updated_at: DateTime<Utc>,
}

impl Universe {
    /// Create a universe from majors and chain lists.
    pub fn new(majors: Vec<TokenRef>, chains: BTreeMap<ChainId, Vec<TokenRef>>) -> Self {
        Self {
            majors,
            chains,
            updated_at: Utc::now(),
        }
    }

    /// Majors first, then chain tokens in chain order, de-duplicated by id.
    pub fn all_tokens(&self) -> Vec<TokenRef> {
        let mut seen = HashSet::new();
        self.majors
            .iter()
            .chain(self.chains.values().flatten())
            .filter(|token| seen.insert(token.id.clone()))
            .cloned()
            .collect()
    }

    /// Look up a token by id.
    pub fn find(&self, id: &TokenId) -> Option<&TokenRef> {
        self.majors
            .iter()
            .chain(self.chains.values().flatten())
            .find(|token| &token.id == id)
    }

    /// Tokens listed for one chain.
    pub fn chain(&self, chain: &ChainId) -> &[TokenRef] {
        self.chains.get(chain).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.all_tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.majors.is_empty() && self.chains.values().all(Vec::is_empty)
    }
}

/// Per-user favorite tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorites {
    pub user_id: UserId,
    pub tokens: Vec<TokenId>,
    pub updated_at: DateTime<Utc>,
}

impl Favorites {
    /// Build a favorites list, keeping first occurrences and at most
    /// [`MAX_FAVORITES`] entries.
    pub fn new(user_id: UserId, tokens: impl IntoIterator<Item = TokenId>) -> Self {
        let mut seen = HashSet::new();
        let tokens = tokens
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .take(MAX_FAVORITES)
            .collect();
        Self {
            user_id,
            tokens,
            updated_at: Utc::now(),
        }
    }

    pub fn empty(user_id: UserId) -> Self {
        Self::new(user_id, Vec::new())
    }
}

/// A raw USD quote returned by a price provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub token_id: TokenId,
    /// Price in USD.
    pub usd: Decimal,
    /// 24h change in percent, when the upstream reports it.
    pub change_24h_pct: Option<Decimal>,
    /// Provider name.
    pub source: String,
}

impl Quote {
    pub fn new(token_id: TokenId, usd: Decimal, source: impl Into<String>) -> Self {
        Self {
            token_id,
            usd,
            change_24h_pct: None,
            source: source.into(),
        }
    }

    pub fn with_change(mut self, change_24h_pct: Decimal) -> Self {
        self.change_24h_pct = Some(change_24h_pct);
        self
    }
}

/// A cached price record converted into a local currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub token_id: TokenId,
    pub symbol: String,
    /// Price in USD as quoted upstream.
    pub usd: Decimal,
    /// Price in `currency`.
    pub local: Decimal,
    pub currency: Currency,
    pub change_24h_pct: Option<Decimal>,
    /// USD to `currency` rate used for `local`.
    pub fx_rate: Decimal,
    /// Provider that quoted `usd`.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl PricePoint {
    /// Convert a provider quote with the given FX rate.
    ///
    /// `None` when the converted price overflows.
    pub fn from_quote(token: &TokenRef, quote: &Quote, fx: &FxRate) -> Option<Self> {
        Some(Self {
            token_id: quote.token_id.clone(),
            symbol: token.symbol.clone(),
            usd: quote.usd,
            local: fx.convert_price(quote.usd)?,
            currency: fx.pair.quote.clone(),
            change_24h_pct: quote.change_24h_pct.map(|c| c.round_dp(2)),
            fx_rate: fx.rate,
            source: quote.source.clone(),
            fetched_at: Utc::now(),
        })
    }

    /// Time since the upstream quote was fetched.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.fetched_at)
    }

    /// Whether the point is older than `after`.
    pub fn is_stale(&self, after: Duration) -> bool {
        self.age() > after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CurrencyPair;
    use rust_decimal_macros::dec;

    fn sample_universe() -> Universe {
        let mut chains = BTreeMap::new();
        chains.insert(
            ChainId::new("ethereum"),
            vec![
                TokenRef::new("ethereum", "eth", "Ethereum").on_chain("ethereum"),
                TokenRef::new("uniswap", "uni", "Uniswap").on_chain("ethereum"),
            ],
        );
        chains.insert(
            ChainId::new("solana"),
            vec![TokenRef::new("jupiter-exchange-solana", "jup", "Jupiter").on_chain("solana")],
        );
        Universe::new(
            vec![
                TokenRef::new("bitcoin", "btc", "Bitcoin").with_binance_symbol("btcusdt"),
                TokenRef::new("ethereum", "eth", "Ethereum"),
            ],
            chains,
        )
    }

    #[test]
    fn test_all_tokens_dedups_and_keeps_order() {
        let universe = sample_universe();
        let ids: Vec<_> = universe
            .all_tokens()
            .into_iter()
            .map(|t| t.id.as_str().to_string())
            .collect();

        assert_eq!(
            ids,
            vec!["bitcoin", "ethereum", "uniswap", "jupiter-exchange-solana"]
        );
        assert_eq!(universe.len(), 4);
        // First occurrence wins: the major has no chain.
        assert!(universe.find(&TokenId::new("ethereum")).unwrap().chain.is_none());
    }

    #[test]
    fn test_chain_lookup() {
        let universe = sample_universe();
        assert_eq!(universe.chain(&ChainId::new("solana")).len(), 1);
        assert!(universe.chain(&ChainId::new("base")).is_empty());
    }

    #[test]
    fn test_token_ref_symbols_upper_case() {
        let token = TokenRef::new("bitcoin", "btc", "Bitcoin").with_binance_symbol("btcusdt");
        assert_eq!(token.symbol, "BTC");
        assert_eq!(token.binance_symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(TokenRef::bare(TokenId::new("pepe")).symbol, "PEPE");
    }

    #[test]
    fn test_favorites_dedup_and_cap() {
        let favs = Favorites::new(
            UserId::new("alice"),
            vec![TokenId::new("bitcoin"), TokenId::new("solana"), TokenId::new("bitcoin")],
        );
        assert_eq!(favs.tokens, vec![TokenId::new("bitcoin"), TokenId::new("solana")]);

        let many = (0..80).map(|i| TokenId::new(format!("token-{i}")));
        let favs = Favorites::new(UserId::new("bob"), many);
        assert_eq!(favs.tokens.len(), MAX_FAVORITES);
        assert_eq!(favs.tokens[0], TokenId::new("token-0"));
    }

    #[test]
    fn test_price_point_from_quote() {
        let token = TokenRef::new("bitcoin", "btc", "Bitcoin");
        let quote = Quote::new(TokenId::new("bitcoin"), dec!(50000), "COINGECKO")
            .with_change(dec!(-1.23456));
        let fx = FxRate::new(CurrencyPair::from_usd(Currency::eur()), dec!(0.92), "TEST");

        let point = PricePoint::from_quote(&token, &quote, &fx).unwrap();

        assert_eq!(point.local, dec!(46000));
        assert_eq!(point.currency, Currency::eur());
        assert_eq!(point.change_24h_pct, Some(dec!(-1.23)));
        assert_eq!(point.symbol, "BTC");
        assert!(!point.is_stale(Duration::seconds(60)));
    }

    #[test]
    fn test_price_point_staleness() {
        let token = TokenRef::new("bitcoin", "btc", "Bitcoin");
        let quote = Quote::new(TokenId::new("bitcoin"), dec!(50000), "TEST");
        let fx = FxRate::identity(Currency::usd());
        let mut point = PricePoint::from_quote(&token, &quote, &fx).unwrap();
        point.fetched_at = Utc::now() - Duration::seconds(300);

        assert!(point.is_stale(Duration::seconds(120)));
    }
}
