use axum::http::{HeaderMap, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::guard::{Middleware, Responder};
use crate::config::ApiKeyConfig;
use crate::context::RequestContext;
use crate::response::Response;

/// Guard that rejects requests without a known API key in the configured header.
pub fn require_api_key(config: ApiKeyConfig) -> Middleware {
    let config = Arc::new(config);
    Arc::new(move |ctx: &RequestContext, responder: &mut Responder| {
        if validate_api_key(ctx.headers(), &config) {
            return true;
        }

        debug!(path = %ctx.path(), header = %config.header, "Rejected request without valid API key");
        responder.respond(
            Response::json(json!({"error": "Invalid or missing API key"}))
                .with_status(StatusCode::UNAUTHORIZED),
        );
        false
    })
}

fn validate_api_key(headers: &HeaderMap, config: &ApiKeyConfig) -> bool {
    headers
        .get(config.header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|key| config.keys.iter().any(|k| k == key))
        .unwrap_or(false)
}
