//! Route guards run inside dispatch, and the axum layers wrapped around the
//! router by the server.

pub mod auth;
pub mod guard;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod request_id;

pub use auth::require_api_key;
pub use guard::{middleware, Middleware, Responder};
pub use logging::create_logging_middleware;
pub use metrics::{init_metrics, metrics_handler, metrics_middleware, record_dispatch};
pub use rate_limit::{create_rate_limiter, rate_limit, RouterRateLimiter};
pub use request_id::{request_id_middleware, RequestId};
