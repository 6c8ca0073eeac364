//! TickerDeck Gateway
//!
//! HTTP service in front of the market engine. It serves converted prices,
//! the token universe and per-user favorites, runs the scheduled refresh
//! behind a shared secret, and executes simulated trades exactly once per
//! idempotency key.

pub mod api;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod state;
pub mod trade;

pub use api::{create_router, ApiServer};
pub use config::{GatewayConfig, LogFormat};
pub use gateway::Gateway;
pub use state::{AppState, ServiceState};
pub use trade::{TradeExecutor, TradeOutcome};
