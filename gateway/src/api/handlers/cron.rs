//! Scheduled refresh handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tickerdeck_market::RefreshReport;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Refresh status response.
#[derive(Debug, Serialize)]
pub struct CronStatus {
    /// Lifecycle state
    pub state: &'static str,
    /// Configured background interval, 0 when disabled.
    pub refresh_interval_secs: u64,
    /// Report of the last completed refresh, if any.
    pub last_refresh: Option<RefreshReport>,
}

/// Run a refresh now.
///
/// POST /api/cron/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<RefreshReport>> {
    authorize(&state, &headers)?;
    if !state.service_state().accepts_requests() {
        return Err(ApiError::ServiceUnavailable(format!(
            "service is {}",
            state.service_state().as_str()
        )));
    }

    info!("Refresh triggered by cron");
    Ok(Json(state.refresh().await?))
}

/// Last refresh outcome.
///
/// GET /api/cron/status
pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<CronStatus>> {
    Ok(Json(CronStatus {
        state: state.service_state().as_str(),
        refresh_interval_secs: state.config.refresh_interval.as_secs(),
        last_refresh: state.engine.last_refresh().await?,
    }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        warn!("Cron call rejected, no secret configured");
        return Err(ApiError::Unauthorized("cron secret not configured".to_string()));
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(token) if secrets_match(token, secret) => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("invalid bearer token".to_string())),
        None => Err(ApiError::Unauthorized("missing bearer token".to_string())),
    }
}

/// Constant-time comparison over SHA-256 digests.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cres", "s3cret"));
        assert!(!secrets_match("s3cret-longer", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }
}
