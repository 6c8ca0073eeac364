//! Gateway lifecycle: wiring, background tasks and shutdown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use tickerdeck_common::{Result, TickerDeckError};
use tickerdeck_kv::{KvCache, MemoryStore, SharedKvStore};
use tickerdeck_market::{
    BinanceProvider, CoinGeckoConfig, CoinGeckoProvider, ExchangeRateApiProvider,
    FallbackFxProvider, FallbackPriceProvider, FxProvider, MarketEngine, PriceProvider,
    StaticFxProvider,
};

use crate::config::GatewayConfig;
use crate::metrics::Metrics;
use crate::state::{AppState, ServiceState, UpstreamHandles};
use crate::trade::TradeExecutor;

/// Owns the shared state and the background tasks around it.
pub struct Gateway {
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Build a gateway talking to the configured upstream APIs.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config
            .validate()
            .map_err(TickerDeckError::ConfigurationError)?;

        let providers = &config.providers;
        let chain: Vec<Arc<dyn PriceProvider>> = vec![
            Arc::new(CoinGeckoProvider::new(CoinGeckoConfig {
                base_url: providers.coingecko_base_url.clone(),
                api_key: providers.coingecko_api_key.clone(),
                timeout: providers.request_timeout,
                ..CoinGeckoConfig::default()
            })),
            Arc::new(BinanceProvider::with_timeout(
                providers.binance_base_url.clone(),
                providers.request_timeout,
            )),
        ];
        let prices = Arc::new(FallbackPriceProvider::new(chain));

        let static_rates = StaticFxProvider::parse(&providers.fx_fallback_rates)
            .map_err(|e| TickerDeckError::ConfigurationError(e.to_string()))?;
        let live_rates = ExchangeRateApiProvider::with_timeout(
            providers.fx_base_url.clone(),
            providers.request_timeout,
        );
        let fx = Arc::new(FallbackFxProvider::new(
            Arc::new(live_rates),
            Arc::new(static_rates),
        ));

        let upstream = UpstreamHandles {
            prices: Some(prices.clone()),
            fx: Some(fx.clone()),
        };
        Ok(Self::assemble(config, prices, fx, upstream))
    }

    /// Build a gateway over caller-supplied providers.
    pub fn with_providers(
        config: GatewayConfig,
        prices: Arc<dyn PriceProvider>,
        fx: Arc<dyn FxProvider>,
    ) -> Self {
        Self::assemble(config, prices, fx, UpstreamHandles::default())
    }

    fn assemble(
        config: GatewayConfig,
        prices: Arc<dyn PriceProvider>,
        fx: Arc<dyn FxProvider>,
        upstream: UpstreamHandles,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let shared: SharedKvStore = store.clone();
        let metrics = Arc::new(Metrics::new());

        let engine = Arc::new(MarketEngine::new(
            prices,
            fx,
            KvCache::new(shared.clone(), ""),
            config.market_engine_config(),
        ));
        let trades = TradeExecutor::new(
            shared,
            engine.clone(),
            config.trade.clone(),
            config.local_currency.clone(),
            metrics.clone(),
        );

        let state = Arc::new(AppState::new(config, engine, trades, metrics, upstream));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            state,
            store,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Shared state handed to the HTTP layer.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Start background tasks and begin accepting requests.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        info!(
            currency = %self.state.config.local_currency,
            refresh_interval_secs = self.state.config.refresh_interval.as_secs(),
            "Starting gateway"
        );

        self.state.set_service_state(ServiceState::Running);
        self.start_background_tasks();

        info!("Gateway started");
        Ok(())
    }

    /// Stop background tasks and refuse further work.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        if self.state.service_state().is_terminal() {
            return Ok(());
        }
        info!("Stopping gateway");

        self.state.set_service_state(ServiceState::ShuttingDown);
        let _ = self.shutdown_tx.send(true);

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.state.set_service_state(ServiceState::Stopped);
        info!("Gateway stopped");
        Ok(())
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    fn start_background_tasks(&self) {
        let mut tasks = self.tasks.lock();

        let interval = self.state.config.refresh_interval;
        if interval.is_zero() {
            info!("Background refresh disabled");
        } else {
            let state = self.state.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(run_refresh_loop(state, interval, shutdown)));
        }

        let store = self.store.clone();
        let eviction = self.state.config.cache.eviction_interval;
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = store.run_eviction_loop(eviction) => {}
                _ = shutdown.changed() => {}
            }
        }));
    }
}

async fn run_refresh_loop(
    state: Arc<AppState>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match state.refresh().await {
            Ok(report) => info!(
                prices_updated = report.prices_updated,
                missing = report.missing.len(),
                duration_ms = report.duration_ms,
                "Scheduled refresh complete"
            ),
            Err(TickerDeckError::RefreshInProgress) => {}
            Err(e) => error!(error = %e, "Scheduled refresh failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickerdeck_common::Currency;
    use tickerdeck_market::{MockFxProvider, MockPriceProvider};

    fn test_gateway(refresh_interval: Duration) -> Gateway {
        let prices = Arc::new(MockPriceProvider::new("mock"));
        prices.set_price("bitcoin", dec!(50000));
        let fx = Arc::new(MockFxProvider::new("mock-fx"));
        fx.set_usd_rate(Currency::eur(), dec!(0.9));

        let config = GatewayConfig {
            refresh_interval,
            ..GatewayConfig::default()
        };
        Gateway::with_providers(config, prices, fx)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GatewayConfig {
            listen_port: 0,
            ..GatewayConfig::default()
        };
        assert!(matches!(
            Gateway::new(config),
            Err(TickerDeckError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_new_wires_upstream_handles() {
        let gateway = Gateway::new(GatewayConfig::default()).unwrap();
        assert!(gateway.state().upstream.prices.is_some());
        assert_eq!(gateway.state().upstream.fallbacks(), 0);
    }

    #[tokio::test]
    async fn test_gateway_start_stop() {
        let gateway = test_gateway(Duration::ZERO);
        assert_eq!(gateway.state().service_state(), ServiceState::Starting);

        gateway.start().await.unwrap();
        assert_eq!(gateway.state().service_state(), ServiceState::Running);

        gateway.stop().await.unwrap();
        assert_eq!(gateway.state().service_state(), ServiceState::Stopped);

        // Idempotent.
        gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_background_refresh_warms_cache() {
        let gateway = test_gateway(Duration::from_secs(3600));
        gateway.start().await.unwrap();

        let mut report = None;
        for _ in 0..50 {
            report = gateway.state().engine.last_refresh().await.unwrap();
            if report.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        gateway.stop().await.unwrap();

        let report = report.expect("refresh report stored");
        assert_eq!(report.currency, Currency::eur());
        assert!(report.prices_updated >= 1);
        assert!(gateway.state().metrics.snapshot().refreshes_success >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_signal_resolves_after_stop() {
        let gateway = test_gateway(Duration::ZERO);
        gateway.start().await.unwrap();

        let signal = tokio::spawn(gateway.shutdown_signal());
        gateway.stop().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), signal)
            .await
            .unwrap()
            .unwrap();
    }
}
