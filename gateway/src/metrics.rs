//! Metrics collection for gateway monitoring.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tickerdeck_market::CacheStats;

/// Gateway metrics.
pub struct Metrics {
    /// Refresh runs started.
    pub refreshes_total: AtomicU64,
    /// Refresh runs that stored prices.
    pub refreshes_success: AtomicU64,
    /// Refresh runs that failed.
    pub refreshes_failed: AtomicU64,
    /// Refresh runs skipped because another held the lock.
    pub refreshes_skipped: AtomicU64,
    /// Price points returned to clients.
    pub prices_served: AtomicU64,
    /// Trades executed.
    pub trades_executed: AtomicU64,
    /// Trades answered from the idempotency cache.
    pub trades_replayed: AtomicU64,
    /// Trades rejected by the execution lock or a reused key.
    pub trade_conflicts: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            refreshes_total: AtomicU64::new(0),
            refreshes_success: AtomicU64::new(0),
            refreshes_failed: AtomicU64::new(0),
            refreshes_skipped: AtomicU64::new(0),
            prices_served: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            trades_replayed: AtomicU64::new(0),
            trade_conflicts: AtomicU64::new(0),
        }
    }

    pub fn refresh_started(&self) {
        self.refreshes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_success(&self) {
        self.refreshes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_failed(&self) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_skipped(&self) {
        self.refreshes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn prices_served(&self, count: usize) {
        self.prices_served.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn trade_executed(&self) {
        self.trades_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_replayed(&self) {
        self.trades_replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_conflict(&self) {
        self.trade_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refreshes_total: self.refreshes_total.load(Ordering::Relaxed),
            refreshes_success: self.refreshes_success.load(Ordering::Relaxed),
            refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
            refreshes_skipped: self.refreshes_skipped.load(Ordering::Relaxed),
            prices_served: self.prices_served.load(Ordering::Relaxed),
            trades_executed: self.trades_executed.load(Ordering::Relaxed),
            trades_replayed: self.trades_replayed.load(Ordering::Relaxed),
            trade_conflicts: self.trade_conflicts.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    ///
    /// Cache and provider figures are owned by the market engine and passed
    /// in at scrape time.
    pub fn to_prometheus(&self, cache: CacheStats, provider_fallbacks: u64) -> String {
        let s = self.snapshot();
        let counters = [
            ("refreshes_total", "Refresh runs started", s.refreshes_total),
            ("refreshes_success", "Refresh runs completed", s.refreshes_success),
            ("refreshes_failed", "Refresh runs failed", s.refreshes_failed),
            ("refreshes_skipped", "Refresh runs skipped while another held the lock", s.refreshes_skipped),
            ("prices_served", "Price points returned to clients", s.prices_served),
            ("cache_hits", "Price and FX cache hits", cache.hits),
            ("cache_misses", "Price and FX cache misses", cache.misses),
            ("provider_fallbacks", "Upstream failures answered by a fallback provider", provider_fallbacks),
            ("trades_executed", "Simulated trades executed", s.trades_executed),
            ("trades_replayed", "Trades answered from the idempotency cache", s.trades_replayed),
            ("trade_conflicts", "Trades rejected by lock or key reuse", s.trade_conflicts),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP tickerdeck_{name} {help}");
            let _ = writeln!(out, "# TYPE tickerdeck_{name} counter");
            let _ = writeln!(out, "tickerdeck_{name} {value}");
            out.push('\n');
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub refreshes_total: u64,
    pub refreshes_success: u64,
    pub refreshes_failed: u64,
    pub refreshes_skipped: u64,
    pub prices_served: u64,
    pub trades_executed: u64,
    pub trades_replayed: u64,
    pub trade_conflicts: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.refresh_started();
        metrics.refresh_started();
        metrics.refresh_success();
        metrics.prices_served(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.refreshes_total, 2);
        assert_eq!(snapshot.refreshes_success, 1);
        assert_eq!(snapshot.prices_served, 3);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.trade_executed();

        let output = metrics.to_prometheus(CacheStats { hits: 4, misses: 2 }, 1);
        assert!(output.contains("tickerdeck_trades_executed 1"));
        assert!(output.contains("tickerdeck_cache_hits 4"));
        assert!(output.contains("tickerdeck_provider_fallbacks 1"));
        assert!(output.contains("# TYPE tickerdeck_cache_misses counter"));
    }
}
