//! Shared HTTP plumbing for upstream providers.

use std::str::FromStr;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{MarketError, MarketResult};

/// Default timeout for upstream requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a client with the given request timeout.
pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tickerdeck/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            Client::new()
        })
}

/// Send a request and decode a JSON body, mapping failures to [`MarketError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> MarketResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| MarketError::from_reqwest(provider, e))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(MarketError::RateLimited {
            provider: provider.to_string(),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {} - {}", status, truncate(&body, 200));
        let provider = provider.to_string();
        return Err(if status == StatusCode::BAD_REQUEST {
            MarketError::Rejected { provider, message }
        } else {
            MarketError::ProviderError { provider, message }
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| MarketError::from_reqwest(provider, e))?;

    serde_json::from_str(&body).map_err(|e| MarketError::ProviderError {
        provider: provider.to_string(),
        message: format!("Failed to parse response: {}", e),
    })
}

/// Exact decimal from a JSON number, including exponent notation.
pub(crate) fn decimal_from_number(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
