//! HTTP surface of the gateway.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use server::ApiServer;
