//! Per-user favorites handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Deserialize;
use std::sync::Arc;
use tickerdeck_common::{Favorites, TickerDeckError, UserId};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Replace favorites request.
#[derive(Debug, Deserialize)]
pub struct UpdateFavoritesRequest {
    /// Token ids in display order.
    pub tokens: Vec<String>,
}

/// A user's favorites.
///
/// GET /api/favorites/{user}
pub async fn get_favorites(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<Favorites>> {
    let user = parse_user(&user)?;
    Ok(Json(state.engine.universe().favorites(&user).await?))
}

/// Replace a user's favorites.
///
/// PUT /api/favorites/{user}
pub async fn put_favorites(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    body: Result<Json<UpdateFavoritesRequest>, JsonRejection>,
) -> ApiResult<Json<Favorites>> {
    let user = parse_user(&user)?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let favorites = state
        .engine
        .universe()
        .set_favorites(&user, &request.tokens)
        .await?;
    Ok(Json(favorites))
}

fn parse_user(raw: &str) -> ApiResult<UserId> {
    let user = UserId::new(raw);
    if user.is_valid() {
        Ok(user)
    } else {
        Err(TickerDeckError::invalid("user", "invalid user id").into())
    }
}
