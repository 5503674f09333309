//! Ingestion gateway.
//!
//! Accepts upload/URL/live submissions and turns them into queued jobs;
//! exposes poll-based status, cancellation, clip listings, and the
//! fire-and-forget live signal ingest. The gateway only enqueues and
//! reads state; pipeline work never blocks a request handler.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
