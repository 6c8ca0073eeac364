//! Service state and shared application state.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tickerdeck_common::{Result, TickerDeckError};
use tickerdeck_market::{FallbackFxProvider, FallbackPriceProvider, MarketEngine, RefreshReport};
use tracing::warn;

use crate::config::GatewayConfig;
use crate::metrics::SharedMetrics;
use crate::trade::TradeExecutor;

/// Gateway operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Gateway is starting up.
    Starting,
    /// Gateway is running and accepting requests.
    Running,
    /// Gateway is shutting down, not accepting new requests.
    ShuttingDown,
    /// Gateway is stopped.
    Stopped,
}

impl ServiceState {
    /// Check if the gateway is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ServiceState::Running)
    }

    /// Check if the gateway is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::ShuttingDown => "shutting_down",
            ServiceState::Stopped => "stopped",
        }
    }
}

/// Fallback chains kept for their failure counters.
#[derive(Clone, Default)]
pub struct UpstreamHandles {
    pub prices: Option<Arc<FallbackPriceProvider>>,
    pub fx: Option<Arc<FallbackFxProvider>>,
}

impl UpstreamHandles {
    /// Upstream failures answered by a later provider.
    pub fn fallbacks(&self) -> u64 {
        let prices: u64 = self
            .prices
            .as_ref()
            .map(|p| p.failure_counts().iter().map(|(_, n)| n).sum())
            .unwrap_or(0);
        let fx = self.fx.as_ref().map(|f| f.fallback_count()).unwrap_or(0);
        prices + fx
    }
}

/// State shared by every request handler and background task.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: Arc<MarketEngine>,
    pub trades: TradeExecutor,
    pub metrics: SharedMetrics,
    pub upstream: UpstreamHandles,
    service_state: RwLock<ServiceState>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        engine: Arc<MarketEngine>,
        trades: TradeExecutor,
        metrics: SharedMetrics,
        upstream: UpstreamHandles,
    ) -> Self {
        Self {
            config,
            engine,
            trades,
            metrics,
            upstream,
            service_state: RwLock::new(ServiceState::Starting),
            started_at: Instant::now(),
        }
    }

    /// Get the current service state.
    pub fn service_state(&self) -> ServiceState {
        *self.service_state.read()
    }

    pub fn set_service_state(&self, state: ServiceState) {
        *self.service_state.write() = state;
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Refresh prices in the local currency, counting the outcome.
    ///
    /// Shared by the cron route and the background refresher.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        self.metrics.refresh_started();
        match self.engine.refresh(&self.config.local_currency).await {
            Ok(report) => {
                self.metrics.refresh_success();
                Ok(report)
            }
            Err(e) => {
                let e = TickerDeckError::from(e);
                if matches!(e, TickerDeckError::RefreshInProgress) {
                    self.metrics.refresh_skipped();
                } else {
                    self.metrics.refresh_failed();
                    warn!(error = %e, "Refresh failed");
                }
                Err(e)
            }
        }
    }
}
