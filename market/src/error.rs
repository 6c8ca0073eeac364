//! Market data error types.

use tickerdeck_common::{CurrencyPair, TickerDeckError};
use tickerdeck_kv::KvError;
use thiserror::Error;

/// Errors that can occur while fetching, converting or caching prices.
#[derive(Debug, Error)]
pub enum MarketError {
    /// FX rate not available for the requested pair.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// Provider returned an error.
    #[error("Provider error: {provider} - {message}")]
    ProviderError { provider: String, message: String },

    /// Provider refused the request as malformed (HTTP 400).
    #[error("Rejected by {provider}: {message}")]
    Rejected { provider: String, message: String },

    /// Provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// Request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// No configured provider supports the request.
    #[error("No providers available")]
    NoProvidersAvailable,

    /// Every provider was tried and every one failed.
    #[error("All providers failed")]
    AllProvidersFailed,

    /// Another refresh holds the refresh lock.
    #[error("Refresh already in progress")]
    RefreshInProgress,

    /// Input rejected before reaching a provider.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cache backend failure.
    #[error("Cache error: {0}")]
    Cache(#[from] KvError),
}

impl MarketError {
    /// Map a transport error from `provider`.
    pub fn from_reqwest(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            MarketError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            MarketError::ProviderError {
                provider: provider.to_string(),
                message: format!("Request failed: {}", error),
            }
        }
    }
}

impl From<MarketError> for TickerDeckError {
    fn from(error: MarketError) -> Self {
        match error {
            MarketError::RateNotAvailable(pair) => TickerDeckError::FxUnavailable(pair.to_string()),
            MarketError::ProviderError { provider, message }
            | MarketError::Rejected { provider, message } => {
                TickerDeckError::Upstream { provider, message }
            }
            MarketError::RateLimited { provider } => TickerDeckError::RateLimited {
                provider,
                retry_after_ms: 60_000,
            },
            MarketError::Timeout { provider } => {
                TickerDeckError::Timeout(format!("request to {}", provider))
            }
            MarketError::NoProvidersAvailable => TickerDeckError::Upstream {
                provider: "ALL".to_string(),
                message: "No providers available".to_string(),
            },
            MarketError::AllProvidersFailed => TickerDeckError::Upstream {
                provider: "ALL".to_string(),
                message: "All providers failed".to_string(),
            },
            MarketError::RefreshInProgress => TickerDeckError::RefreshInProgress,
            MarketError::InvalidInput(message) => TickerDeckError::InvalidRequest {
                message,
                field: None,
            },
            MarketError::Cache(e) => TickerDeckError::CacheError(e.to_string()),
        }
    }
}

/// Result type for market operations.
pub type MarketResult<T> = Result<T, MarketError>;
