//! Gateway configuration.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use tickerdeck_common::{constants, Currency, DurationExt};
use tickerdeck_market::{
    coingecko, fx, binance, MarketCacheConfig, MarketEngineConfig, StaticFxProvider,
};

/// Cache lifetimes and staleness threshold.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cached price lifetime.
    pub price_ttl: Duration,
    /// Cached FX rate lifetime.
    pub fx_ttl: Duration,
    /// Cached universe lifetime.
    pub universe_ttl: Duration,
    /// Age after which served prices are flagged stale.
    pub stale_after: Duration,
    /// Memory store eviction interval.
    pub eviction_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            price_ttl: constants::price_ttl().as_std(),
            fx_ttl: constants::fx_ttl().as_std(),
            universe_ttl: constants::universe_ttl().as_std(),
            stale_after: constants::stale_after().as_std(),
            eviction_interval: Duration::from_secs(30),
        }
    }
}

/// Upstream provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// CoinGecko API root.
    pub coingecko_base_url: String,
    /// CoinGecko demo API key.
    pub coingecko_api_key: Option<String>,
    /// Binance API root.
    pub binance_base_url: String,
    /// Exchange-rate API root.
    pub fx_base_url: String,
    /// Static USD rates used when the FX API is down, `CODE=rate,...`.
    pub fx_fallback_rates: String,
    /// Upstream request timeout.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            coingecko_base_url: coingecko::DEFAULT_BASE_URL.to_string(),
            coingecko_api_key: None,
            binance_base_url: binance::DEFAULT_BASE_URL.to_string(),
            fx_base_url: fx::DEFAULT_BASE_URL.to_string(),
            fx_fallback_rates: "EUR=0.92,GBP=0.79,JPY=150,TRY=32".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Simulated trade configuration.
#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// Lifetime of the per-key execution lock.
    pub lock_ttl: Duration,
    /// Lifetime of stored idempotency records.
    pub idempotency_ttl: Duration,
    /// Slippage applied to fills, in basis points.
    pub slippage_bps: u32,
    /// Largest allowed notional in the fill currency.
    pub max_notional: Decimal,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            lock_ttl: constants::trade_lock_ttl().as_std(),
            idempotency_ttl: constants::idempotency_ttl().as_std(),
            slippage_bps: 10,
            max_notional: Decimal::from(1_000_000),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Currency prices are converted into by default.
    pub local_currency: Currency,
    /// Bearer secret for the cron route. Unset rejects every cron call.
    pub cron_secret: Option<String>,
    /// Background refresh interval; zero disables the refresher.
    pub refresh_interval: Duration,
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Provider configuration.
    pub providers: ProviderConfig,
    /// Trade configuration.
    pub trade: TradeConfig,
    /// Log level.
    pub log_level: String,
    /// Log format.
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            local_currency: Currency::eur(),
            cron_secret: None,
            refresh_interval: constants::refresh_interval().as_std(),
            cache: CacheConfig::default(),
            providers: ProviderConfig::default(),
            trade: TradeConfig::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails on a set but unparsable value instead of keeping the default.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GATEWAY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = env_parse("GATEWAY_LISTEN_PORT")? {
            config.listen_port = port;
        }

        if let Ok(currency) = std::env::var("LOCAL_CURRENCY") {
            config.local_currency = Currency::new(currency);
        }

        if let Ok(secret) = std::env::var("CRON_SECRET") {
            if !secret.is_empty() {
                config.cron_secret = Some(secret);
            }
        }

        if let Some(interval) = env_secs("REFRESH_INTERVAL_SECS")? {
            config.refresh_interval = interval;
        }

        if let Some(ttl) = env_secs("PRICE_TTL_SECS")? {
            config.cache.price_ttl = ttl;
        }
        if let Some(ttl) = env_secs("FX_TTL_SECS")? {
            config.cache.fx_ttl = ttl;
        }
        if let Some(ttl) = env_secs("UNIVERSE_TTL_SECS")? {
            config.cache.universe_ttl = ttl;
        }
        if let Some(after) = env_secs("STALE_AFTER_SECS")? {
            config.cache.stale_after = after;
        }

        if let Ok(url) = std::env::var("COINGECKO_BASE_URL") {
            config.providers.coingecko_base_url = url;
        }
        if let Ok(key) = std::env::var("COINGECKO_API_KEY") {
            if !key.is_empty() {
                config.providers.coingecko_api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("BINANCE_BASE_URL") {
            config.providers.binance_base_url = url;
        }
        if let Ok(url) = std::env::var("FX_BASE_URL") {
            config.providers.fx_base_url = url;
        }
        if let Ok(rates) = std::env::var("FX_FALLBACK_RATES") {
            config.providers.fx_fallback_rates = rates;
        }

        if let Some(ttl) = env_secs("TRADE_LOCK_TTL_SECS")? {
            config.trade.lock_ttl = ttl;
        }
        if let Some(ttl) = env_secs("IDEMPOTENCY_TTL_SECS")? {
            config.trade.idempotency_ttl = ttl;
        }
        if let Some(bps) = env_parse("TRADE_SLIPPAGE_BPS")? {
            config.trade.slippage_bps = bps;
        }
        if let Some(max) = env_parse("TRADE_MAX_NOTIONAL")? {
            config.trade.max_notional = max;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(format) = env_parse("LOG_FORMAT")? {
            config.log_format = format;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if !self.local_currency.is_valid() {
            return Err(format!(
                "Local currency must be a 3-letter code, got '{}'",
                self.local_currency
            ));
        }

        if self.cache.price_ttl.is_zero()
            || self.cache.fx_ttl.is_zero()
            || self.cache.universe_ttl.is_zero()
        {
            return Err("Cache TTLs cannot be 0".to_string());
        }

        if self.cache.stale_after > self.cache.price_ttl {
            return Err("Stale threshold cannot exceed price TTL".to_string());
        }

        if self.trade.lock_ttl.is_zero() {
            return Err("Trade lock TTL cannot be 0".to_string());
        }

        if self.trade.lock_ttl >= self.trade.idempotency_ttl {
            return Err("Trade lock TTL must be shorter than idempotency TTL".to_string());
        }

        if self.trade.slippage_bps >= 10_000 {
            return Err("Slippage must be below 10000 bps".to_string());
        }

        if self.trade.max_notional <= Decimal::ZERO {
            return Err("Max notional must be positive".to_string());
        }

        StaticFxProvider::parse(&self.providers.fx_fallback_rates)
            .map_err(|e| format!("Invalid FX_FALLBACK_RATES: {}", e))?;

        Ok(())
    }

    /// Socket address string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    /// Market engine settings derived from this configuration.
    pub fn market_engine_config(&self) -> MarketEngineConfig {
        MarketEngineConfig {
            cache: MarketCacheConfig {
                price_ttl: self.cache.price_ttl,
                fx_ttl: self.cache.fx_ttl,
                universe_ttl: self.cache.universe_ttl,
            },
            stale_after: chrono::Duration::from_std(self.cache.stale_after)
                .unwrap_or_else(|_| constants::stale_after()),
            ..MarketEngineConfig::default()
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, String> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid value for {}: '{}'", name, value)),
        Err(_) => Ok(None),
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>, String> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("TICKERDECK_TEST_NOTIONAL", "abc");
        let result = env_parse::<Decimal>("TICKERDECK_TEST_NOTIONAL");
        assert_eq!(
            result,
            Err("Invalid value for TICKERDECK_TEST_NOTIONAL: 'abc'".to_string())
        );

        std::env::set_var("TICKERDECK_TEST_SECS", " 30 ");
        assert_eq!(
            env_secs("TICKERDECK_TEST_SECS"),
            Ok(Some(Duration::from_secs(30)))
        );

        assert_eq!(env_parse::<u16>("TICKERDECK_TEST_UNSET"), Ok(None));
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.local_currency, Currency::eur());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = GatewayConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.local_currency = Currency::new("EURO");
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.cache.stale_after = config.cache.price_ttl + Duration::from_secs(1);
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.trade.lock_ttl = config.trade.idempotency_ttl;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.providers.fx_fallback_rates = "EUR".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_market_engine_config() {
        let mut config = GatewayConfig::default();
        config.cache.stale_after = Duration::from_secs(30);

        let engine = config.market_engine_config();
        assert_eq!(engine.stale_after, chrono::Duration::seconds(30));
        assert_eq!(engine.cache.price_ttl, Duration::from_secs(300));
    }
}
