//! Price, universe and FX handlers.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;
use tickerdeck_common::{Currency, FxRate, TokenId, Universe};
use tickerdeck_market::PriceBoard;

use crate::api::error::ApiResult;
use crate::state::AppState;

/// Price query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PriceQuery {
    /// Comma-separated token ids; the universe majors when absent.
    #[serde(default)]
    pub ids: Option<String>,
    /// Target currency; the local currency when absent.
    #[serde(default)]
    pub currency: Option<String>,
}

/// FX query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct FxQuery {
    #[serde(default)]
    pub currency: Option<String>,
}

/// Prices for a set of tokens.
///
/// GET /api/prices?ids=bitcoin,ethereum&currency=EUR
pub async fn get_prices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PriceQuery>,
) -> ApiResult<Json<PriceBoard>> {
    let currency = currency_or_local(&state, query.currency.as_deref());

    let mut ids = parse_ids(query.ids.as_deref());
    if ids.is_empty() {
        let universe = state.engine.universe().universe().await?;
        ids = universe.majors.into_iter().map(|t| t.id).collect();
    }

    let board = state.engine.prices(&ids, &currency).await?;
    state.metrics.prices_served(board.prices.len());
    Ok(Json(board))
}

/// The tracked token universe.
///
/// GET /api/universe
pub async fn get_universe(State(state): State<Arc<AppState>>) -> ApiResult<Json<Universe>> {
    Ok(Json(state.engine.universe().universe().await?))
}

/// Current USD rate into a currency.
///
/// GET /api/fx?currency=EUR
pub async fn get_fx(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FxQuery>,
) -> ApiResult<Json<FxRate>> {
    let currency = currency_or_local(&state, query.currency.as_deref());
    Ok(Json(state.engine.fx_rate(&currency).await?))
}

fn currency_or_local(state: &AppState, raw: Option<&str>) -> Currency {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(code) => Currency::new(code),
        None => state.config.local_currency.clone(),
    }
}

/// Split `a,b, c` into ids, dropping empty segments.
fn parse_ids(raw: Option<&str>) -> Vec<TokenId> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TokenId::new)
        .collect()
}
