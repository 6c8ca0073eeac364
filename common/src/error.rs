//! Error types shared by TickerDeck services.

use crate::{IdempotencyKey, TokenId};
use thiserror::Error;

/// Main error type for TickerDeck operations.
#[derive(Error, Debug)]
pub enum TickerDeckError {
    /// Invalid request content.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        field: Option<String>,
    },

    /// No price available, neither fresh nor cached.
    #[error("Price unavailable for {0}")]
    PriceUnavailable(TokenId),

    /// FX rate could not be obtained.
    #[error("FX rate unavailable for {0}")]
    FxUnavailable(String),

    /// Upstream provider failed.
    #[error("Upstream error from {provider}: {message}")]
    Upstream { provider: String, message: String },

    /// Upstream provider rate limited us.
    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    /// A trade with this idempotency key is being executed right now.
    #[error("Trade with idempotency key {0} is already in progress")]
    TradeInProgress(IdempotencyKey),

    /// Idempotency key was already used for a different request.
    #[error("Idempotency key {0} was already used with a different request")]
    IdempotencyKeyReuse(IdempotencyKey),

    /// A refresh is already running elsewhere.
    #[error("Refresh already in progress")]
    RefreshInProgress,

    /// Key-value store failure.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TickerDeckError {
    /// Shortcut for a validation failure on one field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        TickerDeckError::InvalidRequest {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TickerDeckError::RateLimited { .. }
                | TickerDeckError::Upstream { .. }
                | TickerDeckError::TradeInProgress(_)
                | TickerDeckError::RefreshInProgress
                | TickerDeckError::Timeout(_)
        )
    }

    /// Get suggested retry delay in milliseconds.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            TickerDeckError::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
            TickerDeckError::Upstream { .. } => Some(1000),
            TickerDeckError::TradeInProgress(_) => Some(500),
            TickerDeckError::RefreshInProgress => Some(5000),
            TickerDeckError::Timeout(_) => Some(1000),
            _ => None,
        }
    }

    /// Get the machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            TickerDeckError::InvalidRequest { .. } => "INVALID_REQUEST",
            TickerDeckError::PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            TickerDeckError::FxUnavailable(_) => "FX_UNAVAILABLE",
            TickerDeckError::Upstream { .. } => "UPSTREAM_ERROR",
            TickerDeckError::RateLimited { .. } => "RATE_LIMITED",
            TickerDeckError::TradeInProgress(_) => "TRADE_IN_PROGRESS",
            TickerDeckError::IdempotencyKeyReuse(_) => "IDEMPOTENCY_KEY_REUSE",
            TickerDeckError::RefreshInProgress => "REFRESH_IN_PROGRESS",
            TickerDeckError::CacheError(_) => "CACHE_ERROR",
            TickerDeckError::Timeout(_) => "TIMEOUT",
            TickerDeckError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            TickerDeckError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for TickerDeck operations.
pub type Result<T> = std::result::Result<T, TickerDeckError>;
