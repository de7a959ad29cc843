//! HTTP adapters - upgrade endpoint and health check.

mod dto;
mod handlers;
mod routes;

pub use dto::HealthResponse;
pub use routes::app_router;
