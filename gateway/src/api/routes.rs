//! API route definitions.

use axum::{
    Router,
    http::{HeaderName, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers::{cron, favorites, health, prices, trade};
use crate::state::AppState;

/// Creates the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let ops_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics));

    let api_routes = Router::new()
        .route("/prices", get(prices::get_prices))
        .route("/universe", get(prices::get_universe))
        .route("/fx", get(prices::get_fx))
        .route(
            "/favorites/{user}",
            get(favorites::get_favorites).put(favorites::put_favorites),
        )
        .route("/cron/refresh", post(cron::refresh))
        .route("/cron/status", get(cron::status))
        .route("/trade/execute", post(trade::execute_trade));

    Router::new()
        .merge(ops_routes)
        .nest("/api", api_routes)
        .layer(build_cors_layer())
        .with_state(state)
}

/// Browser clients read prices cross-origin and send the idempotency key.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            trade::IDEMPOTENCY_KEY,
        ])
        .expose_headers([trade::IDEMPOTENT_REPLAYED, HeaderName::from_static("retry-after")])
        .max_age(Duration::from_secs(3600))
}
