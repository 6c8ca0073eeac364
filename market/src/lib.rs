//! TickerDeck Market
//!
//! Price aggregation for the dashboard: fetches USD quotes from upstream
//! providers, converts them into a local currency with a periodically
//! refreshed FX rate, and keeps the results in the KV store with a TTL.
//!
//! # Features
//!
//! - CoinGecko and Binance price providers behind a fallback chain
//! - Live FX rates with a static fallback table
//! - Market cache with last-known-good copies
//! - Token universe and per-user favorites
//! - Lock-guarded refresh flow for cron and background jobs
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickerdeck_market::{MarketEngine, MarketEngineConfig};
//!
//! let engine = MarketEngine::new(prices, fx, kv, MarketEngineConfig::default());
//! let board = engine.prices(&[TokenId::new("bitcoin")], &Currency::eur()).await?;
//! ```

pub mod error;
mod http;
pub mod provider;
pub mod coingecko;
pub mod binance;
pub mod fx;
pub mod cache;
pub mod universe;
pub mod engine;

pub use error::{MarketError, MarketResult};
pub use provider::{FallbackPriceProvider, PriceProvider};
pub use coingecko::{CoinGeckoConfig, CoinGeckoProvider};
pub use binance::BinanceProvider;
pub use fx::{ExchangeRateApiProvider, FallbackFxProvider, FxProvider, StaticFxProvider};
pub use cache::{CacheStats, MarketCache, MarketCacheConfig, PriceLookup};
pub use universe::{default_universe, UniverseService};
pub use engine::{MarketEngine, MarketEngineConfig, MarketEngineStats, PriceBoard, RefreshReport, ServedPrice};

#[cfg(any(test, feature = "test-utils"))]
pub use fx::MockFxProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockPriceProvider;
