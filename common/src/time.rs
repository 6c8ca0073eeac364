//! Time utilities and default TTLs for TickerDeck.

use chrono::Duration;

/// Default cache lifetimes and lock windows.
pub mod constants {
    use super::Duration;

    /// Cached price point lifetime (5 minutes).
    pub fn price_ttl() -> Duration {
        Duration::seconds(300)
    }

    /// Age after which a served price is flagged stale (2 minutes).
    pub fn stale_after() -> Duration {
        Duration::seconds(120)
    }

    /// Cached FX rate lifetime (1 hour).
    pub fn fx_ttl() -> Duration {
        Duration::hours(1)
    }

    /// Cached universe lifetime (1 day).
    pub fn universe_ttl() -> Duration {
        Duration::days(1)
    }

    /// Trade execution lock lifetime (10 seconds).
    pub fn trade_lock_ttl() -> Duration {
        Duration::seconds(10)
    }

    /// Idempotency record lifetime (24 hours).
    pub fn idempotency_ttl() -> Duration {
        Duration::hours(24)
    }

    /// Refresh lock lifetime (2 minutes).
    pub fn refresh_lock_ttl() -> Duration {
        Duration::seconds(120)
    }

    /// Background refresh interval (1 minute).
    pub fn refresh_interval() -> Duration {
        Duration::seconds(60)
    }
}

/// Conversions between chrono and std durations.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
