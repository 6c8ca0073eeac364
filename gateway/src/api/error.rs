//! API error types.
//!
//! Domain errors keep their machine-readable code; the status is chosen
//! here so every route reports failures the same way.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tickerdeck_common::TickerDeckError;
use tickerdeck_market::MarketError;

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request outside the domain types (headers, body syntax).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong cron secret.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Service is not accepting work.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Error raised by the price, FX or trade layers.
    #[error(transparent)]
    Domain(#[from] TickerDeckError),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Domain(e) => match e {
                TickerDeckError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                TickerDeckError::PriceUnavailable(_) => StatusCode::NOT_FOUND,
                TickerDeckError::TradeInProgress(_) | TickerDeckError::RefreshInProgress => {
                    StatusCode::CONFLICT
                }
                TickerDeckError::IdempotencyKeyReuse(_) => StatusCode::UNPROCESSABLE_ENTITY,
                TickerDeckError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                TickerDeckError::Upstream { .. }
                | TickerDeckError::FxUnavailable(_)
                | TickerDeckError::Timeout(_) => StatusCode::BAD_GATEWAY,
                TickerDeckError::CacheError(_)
                | TickerDeckError::ConfigurationError(_)
                | TickerDeckError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns the error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Domain(e) => e.error_code(),
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Domain(e) => e.retry_after_ms().map(|ms| ms.div_ceil(1000)),
            _ => None,
        }
    }
}

impl From<MarketError> for ApiError {
    fn from(error: MarketError) -> Self {
        ApiError::Domain(error.into())
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `"error"`.
    pub status: &'static str,
    /// Error code
    pub code: &'static str,
    /// Error message
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "Request failed");
        }

        let retry_after = self.retry_after_secs();
        let body = ErrorResponse {
            status: "error",
            code: self.error_code(),
            message: self.to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
