use axum::http::StatusCode;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

use super::guard::{Middleware, Responder};
use crate::config::RateLimitConfig;
use crate::context::RequestContext;
use crate::response::Response;

pub type RouterRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// Create a rate limiter from config. Zero values fall back to defaults;
/// `Config::validate` rejects them before this point.
pub fn create_rate_limiter(config: &RateLimitConfig) -> RouterRateLimiter {
    let per_second = u32::try_from(config.requests_per_second)
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
    let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(per_second);

    Arc::new(RateLimiter::direct(
        Quota::per_second(per_second).allow_burst(burst),
    ))
}

/// Guard sharing one limiter across every route it is attached to.
pub fn rate_limit(limiter: RouterRateLimiter) -> Middleware {
    Arc::new(move |ctx: &RequestContext, responder: &mut Responder| {
        match limiter.check() {
            Ok(_) => true,
            Err(_) => {
                debug!(path = %ctx.path(), "Rate limit exceeded");
                responder.respond(
                    Response::json(json!({"error": "Rate limit exceeded"}))
                        .with_status(StatusCode::TOO_MANY_REQUESTS),
                );
                false
            }
        }
    })
}
