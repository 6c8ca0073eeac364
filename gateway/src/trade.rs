//! Simulated trade execution guarded by a lock and an idempotency cache.
//!
//! A request carries a client key. The first request under a key takes a
//! short-lived lock `lock:trade:{user}:{key}`, prices the fill and stores the
//! receipt under `idem:{user}:{key}`. Later requests with the same payload get
//! the stored receipt back; a different payload under a used key is rejected.

use std::sync::Arc;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tickerdeck_common::{
    Currency, IdempotencyKey, IdempotencyRecord, Result, TickerDeckError, TradeId, TradeReceipt,
    TradeRequest,
};
use tickerdeck_kv::{DistributedLock, KvCache, KvError, SharedKvStore};
use tickerdeck_market::MarketEngine;
use tracing::{debug, info, instrument, warn};

use crate::config::TradeConfig;
use crate::metrics::SharedMetrics;

const BPS_DIVISOR: u32 = 10_000;

/// Outcome of an execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    /// Executed by this request.
    Executed(TradeReceipt),
    /// Answered from the idempotency cache.
    Replayed(TradeReceipt),
}

impl TradeOutcome {
    pub fn receipt(&self) -> &TradeReceipt {
        match self {
            TradeOutcome::Executed(receipt) | TradeOutcome::Replayed(receipt) => receipt,
        }
    }

    pub fn into_receipt(self) -> TradeReceipt {
        match self {
            TradeOutcome::Executed(receipt) | TradeOutcome::Replayed(receipt) => receipt,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, TradeOutcome::Replayed(_))
    }
}

/// Executes simulated trades exactly once per idempotency key.
pub struct TradeExecutor {
    engine: Arc<MarketEngine>,
    records: KvCache,
    locks: DistributedLock,
    config: TradeConfig,
    local_currency: Currency,
    metrics: SharedMetrics,
}

impl TradeExecutor {
    pub fn new(
        store: SharedKvStore,
        engine: Arc<MarketEngine>,
        config: TradeConfig,
        local_currency: Currency,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            engine,
            records: KvCache::new(store.clone(), "idem"),
            locks: DistributedLock::new(store),
            config,
            local_currency,
            metrics,
        }
    }

    /// Execute `request` under `key`, or replay the stored receipt.
    #[instrument(skip(self, request), fields(key = %key, user = %request.user_id, token = %request.token_id))]
    pub async fn execute(&self, key: &IdempotencyKey, request: TradeRequest) -> Result<TradeOutcome> {
        let request = self.normalize(request);
        self.validate(key, &request)?;

        let fingerprint = fingerprint(&request)?;
        let record_key = format!("{}:{}", request.user_id, key);

        if let Some(outcome) = self.replay(key, &record_key, &fingerprint).await? {
            return Ok(outcome);
        }

        let lock_key = format!("trade:{}", record_key);
        let Some(guard) = self
            .locks
            .try_acquire(&lock_key, self.config.lock_ttl)
            .await
            .map_err(cache_error)?
        else {
            self.metrics.trade_conflict();
            info!("Trade already in progress");
            return Err(TickerDeckError::TradeInProgress(key.clone()));
        };

        let result = self
            .execute_locked(key, &record_key, &fingerprint, &request)
            .await;

        match guard.release().await {
            Ok(()) => {}
            Err(KvError::LockLost { key }) => {
                warn!(lock = %key, "Trade outlived its lock");
            }
            Err(e) => warn!(error = %e, "Failed to release trade lock"),
        }

        result
    }

    async fn execute_locked(
        &self,
        key: &IdempotencyKey,
        record_key: &str,
        fingerprint: &str,
        request: &TradeRequest,
    ) -> Result<TradeOutcome> {
        // A request that held the lock before us may have finished meanwhile.
        if let Some(outcome) = self.replay(key, record_key, fingerprint).await? {
            return Ok(outcome);
        }

        let receipt = self.fill(request).await?;
        let record = IdempotencyRecord::new(key.clone(), fingerprint.to_string(), receipt.clone());
        self.records
            .set_json(record_key, &record, Some(self.config.idempotency_ttl))
            .await
            .map_err(cache_error)?;

        self.metrics.trade_executed();
        info!(
            trade_id = %receipt.trade_id,
            side = %receipt.side,
            price = %receipt.price,
            notional = %receipt.notional,
            currency = %receipt.currency,
            "Simulated trade executed"
        );
        Ok(TradeOutcome::Executed(receipt))
    }

    async fn replay(
        &self,
        key: &IdempotencyKey,
        record_key: &str,
        fingerprint: &str,
    ) -> Result<Option<TradeOutcome>> {
        let Some(record) = self
            .records
            .get_json::<IdempotencyRecord>(record_key)
            .await
            .map_err(cache_error)?
        else {
            return Ok(None);
        };

        if record.matches(fingerprint) {
            self.metrics.trade_replayed();
            debug!(trade_id = %record.receipt.trade_id, "Replaying stored receipt");
            Ok(Some(TradeOutcome::Replayed(record.receipt)))
        } else {
            self.metrics.trade_conflict();
            warn!("Idempotency key reused with a different request");
            Err(TickerDeckError::IdempotencyKeyReuse(key.clone()))
        }
    }

    async fn fill(&self, request: &TradeRequest) -> Result<TradeReceipt> {
        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.local_currency.clone());

        let board = self
            .engine
            .prices(std::slice::from_ref(&request.token_id), &currency)
            .await?;
        let served = board
            .get(&request.token_id)
            .ok_or_else(|| TickerDeckError::PriceUnavailable(request.token_id.clone()))?;
        if served.stale {
            warn!(fetched_at = %served.point.fetched_at, "Filling against a stale price");
        }

        let slippage = Decimal::from(self.config.slippage_bps) / Decimal::from(BPS_DIVISOR);
        let price = served
            .point
            .local
            .checked_mul(Decimal::ONE + request.side.slippage_sign() * slippage)
            .map(|p| currency.round_price(p))
            .ok_or_else(|| TickerDeckError::invalid("token_id", "price out of range"))?;
        let notional = price
            .checked_mul(request.quantity)
            .ok_or_else(|| TickerDeckError::invalid("quantity", "notional out of range"))?
            .round_dp(currency.decimal_places());

        if notional > self.config.max_notional {
            return Err(TickerDeckError::invalid(
                "quantity",
                format!(
                    "notional {} {} exceeds limit {}",
                    notional, currency, self.config.max_notional
                ),
            ));
        }

        Ok(TradeReceipt {
            trade_id: TradeId::new(),
            user_id: request.user_id.clone(),
            token_id: request.token_id.clone(),
            symbol: served.point.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
            notional,
            currency,
            fx_rate: served.point.fx_rate,
            price_source: served.point.source.clone(),
            executed_at: chrono::Utc::now(),
            simulated: true,
        })
    }

    /// Fill in defaults so equivalent requests hash the same.
    fn normalize(&self, mut request: TradeRequest) -> TradeRequest {
        request.quantity = request.quantity.normalize();
        request.currency = Some(
            request
                .currency
                .take()
                .unwrap_or_else(|| self.local_currency.clone()),
        );
        request
    }

    fn validate(&self, key: &IdempotencyKey, request: &TradeRequest) -> Result<()> {
        if !key.is_valid() {
            return Err(TickerDeckError::invalid(
                "Idempotency-Key",
                "must be 1-128 characters of [A-Za-z0-9_-:.]",
            ));
        }
        if !request.user_id.is_valid() {
            return Err(TickerDeckError::invalid("user_id", "invalid user id"));
        }
        if !request.token_id.is_valid() {
            return Err(TickerDeckError::invalid("token_id", "invalid token id"));
        }
        if request.quantity <= Decimal::ZERO {
            return Err(TickerDeckError::invalid("quantity", "must be positive"));
        }
        if let Some(currency) = &request.currency {
            if !currency.is_valid() {
                return Err(TickerDeckError::invalid("currency", "must be a 3-letter code"));
            }
        }
        Ok(())
    }
}

/// SHA-256 hex digest of the request's JSON form.
pub fn fingerprint(request: &TradeRequest) -> Result<String> {
    let bytes = serde_json::to_vec(request)
        .map_err(|e| TickerDeckError::InternalError(format!("cannot encode request: {}", e)))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn cache_error(error: KvError) -> TickerDeckError {
    TickerDeckError::CacheError(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tickerdeck_common::{TokenId, TradeSide, UserId};
    use tickerdeck_kv::MemoryStore;
    use tickerdeck_market::{MarketEngineConfig, MockFxProvider, MockPriceProvider};

    struct Fixture {
        prices: Arc<MockPriceProvider>,
        store: Arc<MemoryStore>,
        metrics: SharedMetrics,
        executor: Arc<TradeExecutor>,
    }

    fn fixture(config: TradeConfig) -> Fixture {
        let prices = Arc::new(MockPriceProvider::new("mock"));
        let fx = Arc::new(MockFxProvider::new("mock-fx"));
        prices.set_price("bitcoin", dec!(50000));
        fx.set_usd_rate(Currency::eur(), dec!(0.9));

        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(MarketEngine::new(
            prices.clone(),
            fx,
            KvCache::new(store.clone(), ""),
            MarketEngineConfig::default(),
        ));
        let metrics: SharedMetrics = Arc::new(Metrics::new());
        let executor = Arc::new(TradeExecutor::new(
            store.clone(),
            engine,
            config,
            Currency::eur(),
            metrics.clone(),
        ));

        Fixture {
            prices,
            store,
            metrics,
            executor,
        }
    }

    fn buy(quantity: Decimal) -> TradeRequest {
        TradeRequest {
            user_id: UserId::new("alice"),
            token_id: TokenId::new("bitcoin"),
            side: TradeSide::Buy,
            quantity,
            currency: None,
        }
    }

    #[tokio::test]
    async fn test_execute_prices_with_slippage() {
        let f = fixture(TradeConfig::default());

        let outcome = f
            .executor
            .execute(&IdempotencyKey::new("k1"), buy(dec!(0.5)))
            .await
            .unwrap();

        assert!(!outcome.is_replay());
        let receipt = outcome.receipt();
        // 45000 EUR + 10 bps
        assert_eq!(receipt.price, dec!(45045.00));
        assert_eq!(receipt.notional, dec!(22522.50));
        assert_eq!(receipt.currency, Currency::eur());
        assert_eq!(receipt.symbol, "BTC");
        assert!(receipt.simulated);
    }

    #[tokio::test]
    async fn test_sell_receives_less() {
        let f = fixture(TradeConfig::default());
        let mut request = buy(dec!(1));
        request.side = TradeSide::Sell;

        let outcome = f
            .executor
            .execute(&IdempotencyKey::new("k1"), request)
            .await
            .unwrap();

        assert_eq!(outcome.receipt().price, dec!(44955.00));
    }

    #[tokio::test]
    async fn test_replay_returns_identical_receipt() {
        let f = fixture(TradeConfig::default());
        let key = IdempotencyKey::new("k1");

        let first = f.executor.execute(&key, buy(dec!(1))).await.unwrap();
        f.prices.set_price("bitcoin", dec!(60000));
        let second = f.executor.execute(&key, buy(dec!(1.0))).await.unwrap();

        assert!(second.is_replay());
        assert_eq!(first.receipt(), second.receipt());
        assert_eq!(f.metrics.snapshot().trades_executed, 1);
        assert_eq!(f.metrics.snapshot().trades_replayed, 1);
    }

    #[tokio::test]
    async fn test_explicit_local_currency_replays() {
        let f = fixture(TradeConfig::default());
        let key = IdempotencyKey::new("k1");
        f.executor.execute(&key, buy(dec!(1))).await.unwrap();

        let mut explicit = buy(dec!(1));
        explicit.currency = Some(Currency::eur());

        assert!(f.executor.execute(&key, explicit).await.unwrap().is_replay());
    }

    #[tokio::test]
    async fn test_key_reuse_with_different_payload() {
        let f = fixture(TradeConfig::default());
        let key = IdempotencyKey::new("k1");
        f.executor.execute(&key, buy(dec!(1))).await.unwrap();

        let result = f.executor.execute(&key, buy(dec!(2))).await;

        assert!(matches!(result, Err(TickerDeckError::IdempotencyKeyReuse(_))));
        assert_eq!(f.metrics.snapshot().trade_conflicts, 1);
    }

    #[tokio::test]
    async fn test_keys_are_scoped_per_user() {
        let f = fixture(TradeConfig::default());
        let key = IdempotencyKey::new("k1");
        f.executor.execute(&key, buy(dec!(1))).await.unwrap();

        let mut bob = buy(dec!(2));
        bob.user_id = UserId::new("bob");

        assert!(!f.executor.execute(&key, bob).await.unwrap().is_replay());
    }

    #[tokio::test]
    async fn test_held_lock_reports_in_progress() {
        let f = fixture(TradeConfig::default());
        let locks = DistributedLock::new(f.store.clone());
        let _held = locks
            .try_acquire("trade:alice:k1", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();

        let result = f
            .executor
            .execute(&IdempotencyKey::new("k1"), buy(dec!(1)))
            .await;

        assert!(matches!(result, Err(TickerDeckError::TradeInProgress(_))));
    }

    #[tokio::test]
    async fn test_concurrent_same_key_executes_once() {
        let f = fixture(TradeConfig::default());
        let key = IdempotencyKey::new("race");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let executor = f.executor.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                executor.execute(&key, buy(dec!(1))).await
            }));
        }

        let mut executed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(TradeOutcome::Executed(_)) => executed += 1,
                Ok(TradeOutcome::Replayed(_)) => {}
                Err(TickerDeckError::TradeInProgress(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(executed, 1);
        assert_eq!(f.metrics.snapshot().trades_executed, 1);
    }

    #[tokio::test]
    async fn test_validation() {
        let f = fixture(TradeConfig::default());

        let bad_key = f.executor.execute(&IdempotencyKey::new(""), buy(dec!(1))).await;
        assert!(matches!(bad_key, Err(TickerDeckError::InvalidRequest { .. })));

        let zero = f.executor.execute(&IdempotencyKey::new("k1"), buy(dec!(0))).await;
        assert!(matches!(zero, Err(TickerDeckError::InvalidRequest { .. })));

        let mut bad_currency = buy(dec!(1));
        bad_currency.currency = Some(Currency::new("EURO"));
        let result = f.executor.execute(&IdempotencyKey::new("k2"), bad_currency).await;
        assert!(matches!(result, Err(TickerDeckError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_notional_cap() {
        let f = fixture(TradeConfig {
            max_notional: dec!(1000),
            ..TradeConfig::default()
        });

        let result = f
            .executor
            .execute(&IdempotencyKey::new("k1"), buy(dec!(1)))
            .await;

        match result {
            Err(TickerDeckError::InvalidRequest { field, .. }) => {
                assert_eq!(field.as_deref(), Some("quantity"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // Nothing stored, the key is still usable.
        assert!(f
            .executor
            .execute(&IdempotencyKey::new("k1"), buy(dec!(0.01)))
            .await
            .is_ok());
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = fingerprint(&buy(dec!(1))).unwrap();
        let b = fingerprint(&buy(dec!(1))).unwrap();
        let c = fingerprint(&buy(dec!(2))).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
