//! Health check and metrics handlers.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` while requests are accepted, `unavailable` otherwise.
    pub status: &'static str,
    /// Lifecycle state
    pub state: &'static str,
    /// Service version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Default conversion currency
    pub local_currency: String,
}

/// Health check handler.
///
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let service_state = state.service_state();
    let (code, status) = if service_state.accepts_requests() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    let response = HealthResponse {
        status,
        state: service_state.as_str(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        local_currency: state.config.local_currency.to_string(),
    };

    (code, Json(response))
}

/// Prometheus metrics handler.
///
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .to_prometheus(state.engine.stats().cache, state.upstream.fallbacks());

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::Gateway;
    use crate::state::ServiceState;
    use tickerdeck_market::{MockFxProvider, MockPriceProvider};

    fn test_state() -> Arc<AppState> {
        let gateway = Gateway::with_providers(
            GatewayConfig::default(),
            Arc::new(MockPriceProvider::new("mock")),
            Arc::new(MockFxProvider::new("mock-fx")),
        );
        gateway.state().clone()
    }

    #[test]
    fn test_health_check() {
        let state = test_state();

        let response = tokio_test::block_on(health_check(State(state.clone()))).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_service_state(ServiceState::Running);
        let response = tokio_test::block_on(health_check(State(state))).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_metrics_content_type() {
        let response = tokio_test::block_on(metrics(State(test_state()))).into_response();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
