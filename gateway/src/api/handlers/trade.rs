//! Simulated trade handler.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tickerdeck_common::{IdempotencyKey, TradeRequest};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::trade::TradeOutcome;

/// Request header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");
/// Response header set when a stored receipt is returned.
pub const IDEMPOTENT_REPLAYED: HeaderName = HeaderName::from_static("idempotent-replayed");

/// Execute a simulated trade.
///
/// POST /api/trade/execute
///
/// Answers 201 with the receipt when executed, 200 with
/// `Idempotent-Replayed: true` when the key was already used for the same
/// request.
pub async fn execute_trade(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<TradeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    if !state.service_state().accepts_requests() {
        return Err(ApiError::ServiceUnavailable(format!(
            "service is {}",
            state.service_state().as_str()
        )));
    }

    let key = headers
        .get(&IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|v| IdempotencyKey::new(v.trim()))
        .ok_or_else(|| ApiError::BadRequest("Idempotency-Key header is required".to_string()))?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let response = match state.trades.execute(&key, request).await? {
        TradeOutcome::Executed(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        TradeOutcome::Replayed(receipt) => (
            StatusCode::OK,
            [(IDEMPOTENT_REPLAYED, HeaderValue::from_static("true"))],
            Json(receipt),
        )
            .into_response(),
    };
    Ok(response)
}
